//! Server module for mysqlproxy
//!
//! This module contains:
//! - TCP listener
//! - Connection handler (upstream dial)
//! - Session state machine and relay

pub mod connection;
pub mod listener;
pub mod session;

pub use connection::{connect_upstream, Connection};
pub use listener::{Listener, ListenerStats};
pub use session::{DisconnectReason, Phase, Session, SessionState};
