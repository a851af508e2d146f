//! Configuration module for mysqlproxy
//!
//! Configuration comes from an optional YAML file, then `MYSQLPROXY_*`
//! environment variables, then command line flags.
//!
//! ```yaml
//! server:
//!   listen_address: "127.0.0.1:3307"
//!   max_connections: 1000
//! upstream:
//!   address: "127.0.0.1:3306"
//!   connect_timeout_ms: 1000
//! credentials:
//!   username: "root"
//!   password: "${MYSQL_PASSWORD}"
//! ```

mod loader;
mod types;

pub use loader::{apply_env_overrides, load_config, load_config_from_str};
pub use types::*;
