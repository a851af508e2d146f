//! TCP listener for incoming MySQL client connections

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tracing::Instrument;

use super::connection::Connection;
use crate::config::{Config, CredentialOverride};
use crate::error::Result;
use crate::query_logging::QueryObserver;

/// Listener statistics
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections rejected due to limit
    pub connections_rejected: AtomicU64,
}

/// TCP listener that accepts client connections and proxies each one
pub struct Listener {
    /// TCP listener
    listener: TcpListener,
    /// Settings shared by every session
    settings: Arc<CredentialOverride>,
    /// Query observer shared by every session
    observer: Arc<dyn QueryObserver>,
    /// Statistics
    stats: Arc<ListenerStats>,
    /// Shutdown signal receiver
    shutdown_rx: broadcast::Receiver<()>,
    /// Connection limit semaphore (None = unlimited)
    connection_semaphore: Option<Arc<Semaphore>>,
    /// Configured connection limit, for log lines
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured listen address
    pub async fn bind(
        config: &Config,
        observer: Arc<dyn QueryObserver>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.listen_address).await?;
        let addr = listener.local_addr()?;

        // Create connection limit semaphore (0 = unlimited)
        let max_connections = config.server.max_connections;
        let connection_semaphore = if max_connections > 0 {
            info!(
                "Listening on {} (max {} connections), proxying to {}",
                addr, max_connections, config.upstream.address
            );
            Some(Arc::new(Semaphore::new(max_connections)))
        } else {
            info!(
                "Listening on {} (unlimited connections), proxying to {}",
                addr, config.upstream.address
            );
            None
        };

        if !config.has_credentials() {
            info!("No credential override configured, relaying authentication unchanged");
        }

        Ok(Self {
            listener,
            settings: Arc::new(config.credential_override()),
            observer,
            stats: Arc::new(ListenerStats::default()),
            shutdown_rx,
            connection_semaphore,
            max_connections,
        })
    }

    /// Get listener statistics
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Get the local address the listener is bound to.
    ///
    /// This is useful when binding to port 0 to get an OS-assigned port.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until the shutdown signal fires
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            error!("Accept error: {}", e);
                            // Brief delay before retrying
                            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        info!(
            "Listener stopped. Total: {}, Active: {}, Rejected: {}",
            self.stats.connections_accepted.load(Ordering::Relaxed),
            self.stats.connections_active.load(Ordering::Relaxed),
            self.stats.connections_rejected.load(Ordering::Relaxed)
        );

        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        // Try to acquire a connection permit if limiting is enabled
        let permit = match self.connection_semaphore {
            Some(ref semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        "Connection from {} rejected: max connections ({}) reached",
                        addr, self.max_connections
                    );
                    self.stats
                        .connections_rejected
                        .fetch_add(1, Ordering::Relaxed);
                    return;
                }
            },
            None => None,
        };

        debug!("Accepted connection from {}", addr);
        self.stats
            .connections_accepted
            .fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let connection = Connection::new(
            stream,
            addr,
            Arc::clone(&self.settings),
            Arc::clone(&self.observer),
        );
        let stats = Arc::clone(&self.stats);
        let span = tracing::info_span!(target: "mysqlproxy", "connection", client = %addr);

        tokio::spawn(
            async move {
                // Hold permit for connection lifetime
                let _permit = permit;

                match connection.handle().await {
                    Ok(reason) => debug!("Connection from {} closed: {}", addr, reason),
                    Err(e) => warn!("Connection from {} error: {}", addr, e),
                }
                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            }
            .instrument(span),
        );
    }
}
