//! Configuration types

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::query_logging::QueryLoggingConfig;

/// Root configuration structure
///
/// Every section is optional; an empty document yields a proxy listening on
/// `127.0.0.1:3307` that relays to `127.0.0.1:3306` without rewriting
/// credentials.
///
/// # Example
///
/// ```yaml
/// server:
///   listen_address: "0.0.0.0:3307"
///
/// upstream:
///   address: "db.internal:3306"
///   connect_timeout_ms: 1000
///
/// credentials:
///   username: "app"
///   password: "${MYSQL_APP_PASSWORD}"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream MySQL server
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Credentials substituted into every client handshake
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Query audit log configuration
    #[serde(default)]
    pub query_logging: QueryLoggingConfig,
}

impl Config {
    /// Check if credential substitution is configured
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|creds| !creds.username.is_empty())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.listen_address.trim().is_empty() {
            return Err("server.listen_address must not be empty".to_string());
        }
        if self.upstream.address.trim().is_empty() {
            return Err("upstream.address must not be empty".to_string());
        }
        if self.upstream.connect_timeout_ms == 0 {
            return Err("upstream.connect_timeout_ms must be greater than 0".to_string());
        }
        if self.query_logging.enabled && self.query_logging.output_path.is_none() {
            return Err(
                "query_logging.output_path is required when query logging is enabled".to_string(),
            );
        }
        Ok(())
    }

    /// Build the immutable per-session view of this configuration.
    ///
    /// An empty username means no substitution: sessions become pure relays.
    pub fn credential_override(&self) -> CredentialOverride {
        let credentials = self
            .credentials
            .as_ref()
            .filter(|creds| !creds.username.is_empty())
            .map(|creds| UpstreamCredentials {
                username: creds.username.clone(),
                password: Zeroizing::new(creds.password.clone()),
            });

        CredentialOverride {
            upstream_address: self.upstream.address.clone(),
            connect_timeout: Duration::from_millis(self.upstream.connect_timeout_ms),
            credentials,
        }
    }
}

/// Server listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (host:port)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Maximum number of concurrent connections (0 = unlimited)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_connections: default_max_connections(),
        }
    }
}

/// Upstream MySQL server configuration
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Server address (host:port)
    #[serde(default = "default_upstream_address")]
    pub address: String,
    /// Dial timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Credentials to inject during authentication
#[derive(Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    /// Username to present to the upstream server
    #[serde(default)]
    pub username: String,
    /// Password used to answer the upstream challenge
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1:3307".to_string()
}

fn default_upstream_address() -> String {
    "127.0.0.1:3306".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_max_connections() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings every session shares, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CredentialOverride {
    /// Upstream server to dial for each accepted client
    pub upstream_address: String,
    /// Dial timeout
    pub connect_timeout: Duration,
    /// Replacement identity; `None` turns auth rewriting off
    pub credentials: Option<UpstreamCredentials>,
}

/// Identity presented to the upstream server in place of the client's
#[derive(Clone)]
pub struct UpstreamCredentials {
    /// Replacement username
    pub username: String,
    /// Replacement password, wiped on drop
    pub password: Zeroizing<String>,
}

impl fmt::Debug for UpstreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
