//! Session state and relay
//!
//! - [`state`]: per-connection phase machine that decides which packets are rewritten
//! - [`relay`]: bidirectional forwarding that feeds every read through the state machine

pub mod relay;
pub mod state;

pub use relay::{DisconnectReason, Session, READ_BUFFER_SIZE};
pub use state::{
    advance_shared, Action, Direction, ObservedQuery, Phase, SessionState, SharedState,
};
