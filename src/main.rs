//! mysqlproxy - Transparent MySQL proxy with credential substitution
//!
//! This binary listens for MySQL clients, dials the configured upstream for
//! each one, rewrites the handshake to use the configured credentials and
//! logs every query.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use mysqlproxy::{config, Config, Listener, ProxyError, QueryLogger, Result};

#[derive(Parser)]
#[command(name = "mysqlproxy")]
#[command(version)]
#[command(about = "Transparent MySQL proxy with credential substitution")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Upstream MySQL server (host:port)
    #[arg(short, long)]
    server: Option<String>,

    /// Username presented to the upstream server
    #[arg(short, long)]
    user: Option<String>,

    /// Password used to answer the upstream challenge
    #[arg(short, long)]
    password: Option<String>,

    /// Upstream connect timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(self, config: &mut Config) {
        if let Some(addr) = self.listen {
            config.server.listen_address = addr;
        }
        if let Some(addr) = self.server {
            config.upstream.address = addr;
        }
        if let Some(ms) = self.timeout_ms {
            config.upstream.connect_timeout_ms = ms;
        }
        if let Some(user) = self.user {
            config.credentials.get_or_insert_with(Default::default).username = user;
        }
        if let Some(password) = self.password {
            config.credentials.get_or_insert_with(Default::default).password = password;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration; defaults plus env overrides when no file is given
    let mut config = match cli.config {
        Some(ref path) => config::load_config(path)?,
        None => {
            let mut config = Config::default();
            config::apply_env_overrides(&mut config);
            config
        }
    };

    // Initialize logging
    // Priority: --verbose flag, then RUST_LOG env var, then config level
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
    };
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    info!("Starting mysqlproxy v{}", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = cli.config {
        info!("Loaded configuration from {:?}", path);
    }

    cli.apply_overrides(&mut config);
    config.validate().map_err(ProxyError::Config)?;

    let observer = Arc::new(QueryLogger::new(&config.query_logging));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let listener = Listener::bind(&config, observer, shutdown_rx).await?;
    let stats = listener.stats();

    info!(
        "Proxy ready: listening on {} -> {}",
        listener.local_addr()?,
        config.upstream.address
    );

    // Spawn the listener task
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Listener error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Send shutdown signal
    let _ = shutdown_tx.send(());

    // Wait for listener to finish
    let _ = listener_handle.await;

    info!(
        "Shutdown complete. Total connections handled: {}",
        stats
            .connections_accepted
            .load(std::sync::atomic::Ordering::Relaxed)
    );

    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
