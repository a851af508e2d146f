use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL command type detected from query text.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Alter,
    Drop,
    Truncate,
    Grant,
    Revoke,
    Begin,
    Commit,
    Rollback,
    Set,
    Show,
    Explain,
    Use,
    PreparedStatement,
    Other(String),
    Unknown,
}

impl SqlCommandType {
    /// Detect command type from the first keyword of a SQL query string.
    pub fn from_query_text(query: &str) -> Self {
        let first_word = query
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or("")
            .to_uppercase();

        match first_word.as_str() {
            "SELECT" | "WITH" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "REPLACE" => Self::Replace,
            "CREATE" => Self::Create,
            "ALTER" => Self::Alter,
            "DROP" => Self::Drop,
            "TRUNCATE" => Self::Truncate,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "BEGIN" | "START" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ROLLBACK" => Self::Rollback,
            "PREPARE" | "EXECUTE" | "DEALLOCATE" => Self::PreparedStatement,
            "SET" => Self::Set,
            "SHOW" => Self::Show,
            "EXPLAIN" | "DESCRIBE" | "DESC" => Self::Explain,
            "USE" => Self::Use,
            "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single query audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLog {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    /// Username the client presented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user: Option<String>,
    /// Username actually sent upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_user: Option<String>,
    pub command_type: SqlCommandType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    pub truncated: bool,
    pub client_addr: String,
    pub server_addr: String,
}

/// Context carried through a session for log lines and audit entries.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub client_user: Option<String>,
    pub upstream_user: Option<String>,
    pub client_addr: String,
    pub server_addr: String,
}

impl SessionContext {
    /// Context for a freshly accepted client with a random session id.
    pub fn new(client_addr: impl Into<String>, server_addr: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            client_user: None,
            upstream_user: None,
            client_addr: client_addr.into(),
            server_addr: server_addr.into(),
        }
    }
}

/// Cut `text` to at most `max_len` bytes on a char boundary.
///
/// Returns the (possibly shortened) text and whether anything was cut.
pub fn truncate_query(text: &str, max_len: usize) -> (&str, bool) {
    if text.len() <= max_len {
        return (text, false);
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_detection() {
        assert_eq!(
            SqlCommandType::from_query_text("SELECT * FROM users"),
            SqlCommandType::Select
        );
        assert_eq!(
            SqlCommandType::from_query_text("INSERT INTO users VALUES (1)"),
            SqlCommandType::Insert
        );
        assert_eq!(
            SqlCommandType::from_query_text("REPLACE INTO users VALUES (1)"),
            SqlCommandType::Replace
        );
        assert_eq!(
            SqlCommandType::from_query_text("UPDATE users SET name='a'"),
            SqlCommandType::Update
        );
        assert_eq!(
            SqlCommandType::from_query_text("DELETE FROM users WHERE id=1"),
            SqlCommandType::Delete
        );
        assert_eq!(
            SqlCommandType::from_query_text("START TRANSACTION"),
            SqlCommandType::Begin
        );
        assert_eq!(
            SqlCommandType::from_query_text("WITH t AS (SELECT 1) SELECT * FROM t"),
            SqlCommandType::Select
        );
        assert_eq!(
            SqlCommandType::from_query_text("COMMIT;"),
            SqlCommandType::Commit
        );
    }

    #[test]
    fn test_command_type_case_and_whitespace() {
        assert_eq!(
            SqlCommandType::from_query_text("\n\t select 1"),
            SqlCommandType::Select
        );
        assert_eq!(
            SqlCommandType::from_query_text("Show Tables"),
            SqlCommandType::Show
        );
        assert_eq!(
            SqlCommandType::from_query_text("desc users"),
            SqlCommandType::Explain
        );
    }

    #[test]
    fn test_command_type_unknown_and_other() {
        assert_eq!(SqlCommandType::from_query_text(""), SqlCommandType::Unknown);
        assert_eq!(
            SqlCommandType::from_query_text("   "),
            SqlCommandType::Unknown
        );
        assert_eq!(
            SqlCommandType::from_query_text("OPTIMIZE TABLE t"),
            SqlCommandType::Other("OPTIMIZE".to_string())
        );
    }

    #[test]
    fn test_truncate_query() {
        assert_eq!(truncate_query("SELECT 1", 100), ("SELECT 1", false));
        assert_eq!(truncate_query("SELECT 1", 6), ("SELECT", true));
        // 'é' is two bytes; never split it
        assert_eq!(truncate_query("é", 1), ("", true));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionContext::new("127.0.0.1:1", "127.0.0.1:3306");
        let b = SessionContext::new("127.0.0.1:1", "127.0.0.1:3306");
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_query_log_serialization() {
        let log = QueryLog {
            timestamp: DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            session_id: "sess-001".to_string(),
            client_user: Some("alice".to_string()),
            upstream_user: Some("bob".to_string()),
            command_type: SqlCommandType::Select,
            query_text: Some("SELECT 1".to_string()),
            truncated: false,
            client_addr: "127.0.0.1:50000".to_string(),
            server_addr: "127.0.0.1:3306".to_string(),
        };
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"command_type\":\"SELECT\""));
        assert!(json.contains("\"client_user\":\"alice\""));
        assert!(json.contains("\"upstream_user\":\"bob\""));
        assert!(json.contains("\"timestamp\":\"2026-02-24T12:00:00Z\""));
    }

    #[test]
    fn test_query_log_skips_missing_fields() {
        let log = QueryLog {
            timestamp: Utc::now(),
            session_id: "sess-002".to_string(),
            client_user: None,
            upstream_user: None,
            command_type: SqlCommandType::Other("CALL".to_string()),
            query_text: None,
            truncated: false,
            client_addr: "c".to_string(),
            server_addr: "s".to_string(),
        };
        let json = serde_json::to_string(&log).unwrap();
        assert!(!json.contains("query_text"));
        assert!(!json.contains("client_user"));
        assert!(json.contains("\"command_type\":{\"OTHER\":\"CALL\"}"));
    }
}
