//! mysqlproxy - Transparent MySQL proxy with credential substitution
//!
//! This library provides the core functionality for a MySQL proxy that:
//! - Strips `CLIENT_SSL` from the server greeting so sessions stay in plaintext
//! - Replaces the client's username and auth response with configured credentials
//! - Logs every `COM_QUERY` sent on an established session
//! - Relays all other traffic unchanged

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod protocol;
pub mod query_logging;
pub mod server;

pub use config::{Config, CredentialOverride, UpstreamCredentials};
pub use error::{ProxyError, Result};
pub use query_logging::{QueryLogger, QueryObserver, SessionContext};
pub use server::{
    Connection, DisconnectReason, Listener, ListenerStats, Phase, Session, SessionState,
};
