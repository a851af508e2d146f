//! Connection handler for proxied MySQL clients

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::session::{DisconnectReason, Session, SessionState};
use crate::config::CredentialOverride;
use crate::error::{ProxyError, Result};
use crate::query_logging::{QueryObserver, SessionContext};

/// An accepted client connection waiting for its upstream leg
pub struct Connection {
    /// Client TCP stream
    stream: TcpStream,
    /// Client address
    client_addr: SocketAddr,
    /// Upstream address, timeout and credential override
    settings: Arc<CredentialOverride>,
    /// Receives observed queries
    observer: Arc<dyn QueryObserver>,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        stream: TcpStream,
        client_addr: SocketAddr,
        settings: Arc<CredentialOverride>,
        observer: Arc<dyn QueryObserver>,
    ) -> Self {
        Self {
            stream,
            client_addr,
            settings,
            observer,
        }
    }

    /// Dial upstream and relay until either side disconnects.
    ///
    /// On dial failure the client stream is dropped, which closes it, and
    /// the error is returned. There is no retry.
    pub async fn handle(self) -> Result<DisconnectReason> {
        let server = connect_upstream(
            &self.settings.upstream_address,
            self.settings.connect_timeout,
        )
        .await?;

        let context = SessionContext::new(
            self.client_addr.to_string(),
            self.settings.upstream_address.clone(),
        );
        info!(
            session_id = %context.session_id,
            "start new proxy: {} -> {}",
            self.client_addr,
            self.settings.upstream_address
        );

        let state = SessionState::new(self.settings, self.observer, context);
        Ok(Session::new(self.stream, server, state).relay().await)
    }
}

/// Open the upstream TCP connection, bounded by `connect_timeout`
pub async fn connect_upstream(addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
    debug!("Connecting to server at {}", addr);

    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::Timeout(format!("Connecting to {}", addr)))?
        .map_err(|e| ProxyError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on upstream connection: {}", e);
    }

    debug!("Connected to server at {}", addr);
    Ok(stream)
}
