//! Query observers fed by the session state machine.

use chrono::Utc;

use super::config::QueryLoggingConfig;
use super::log_entry::{truncate_query, QueryLog, SessionContext, SqlCommandType};
use super::service::{QueryLogSender, QueryLoggingService};

/// Receives the text of every `COM_QUERY` a client sends once its session is
/// established.
///
/// Called from a relay pump after the session state lock is released.
/// Implementations should still not block, since the pump waits on them.
pub trait QueryObserver: Send + Sync {
    /// Record one observed query
    fn observe(&self, context: &SessionContext, query: &str);
}

/// Default observer: logs every query and optionally appends an audit entry.
pub struct QueryLogger {
    include_query_text: bool,
    max_query_length: usize,
    sender: Option<QueryLogSender>,
}

impl QueryLogger {
    /// Build a logger from config, starting the audit writer when enabled.
    pub fn new(config: &QueryLoggingConfig) -> Self {
        Self {
            include_query_text: config.include_query_text,
            max_query_length: config.max_query_length,
            sender: QueryLoggingService::start(config),
        }
    }

    /// Logger that only writes to the tracing log
    pub fn log_only() -> Self {
        Self {
            include_query_text: true,
            max_query_length: usize::MAX,
            sender: None,
        }
    }

    /// Whether audit entries are being written
    pub fn is_auditing(&self) -> bool {
        self.sender.is_some()
    }

    fn audit_entry(&self, context: &SessionContext, query: &str) -> QueryLog {
        let (query_text, truncated) = if self.include_query_text {
            let (text, truncated) = truncate_query(query, self.max_query_length);
            (Some(text.to_string()), truncated)
        } else {
            (None, false)
        };

        QueryLog {
            timestamp: Utc::now(),
            session_id: context.session_id.clone(),
            client_user: context.client_user.clone(),
            upstream_user: context.upstream_user.clone(),
            command_type: SqlCommandType::from_query_text(query),
            query_text,
            truncated,
            client_addr: context.client_addr.clone(),
            server_addr: context.server_addr.clone(),
        }
    }
}

impl QueryObserver for QueryLogger {
    fn observe(&self, context: &SessionContext, query: &str) {
        info!(
            session_id = %context.session_id,
            client = %context.client_addr,
            "query: {}",
            query
        );

        if let Some(ref sender) = self.sender {
            if !sender.try_send(self.audit_entry(context, query)) {
                debug!(
                    session_id = %context.session_id,
                    "Query log channel full, entry dropped"
                );
            }
        }
    }
}
