//! Query logging and audit infrastructure.
//!
//! Every `COM_QUERY` observed on an established session is handed to a
//! [`QueryObserver`]. The default [`QueryLogger`] writes it to the tracing
//! log and, when enabled, to a JSON Lines audit file.
//!
//! ## Architecture
//!
//! 1. The session state machine extracts query text from client packets
//! 2. `QueryLog` entries are sent via bounded mpsc channel (non-blocking `try_send`)
//! 3. Background `QueryLoggingService` appends JSON Lines to the output file

pub mod config;
pub mod log_entry;
pub mod observer;
pub mod service;

pub use config::QueryLoggingConfig;
pub use log_entry::{QueryLog, SessionContext, SqlCommandType};
pub use observer::{QueryLogger, QueryObserver};
pub use service::{QueryLogSender, QueryLoggingService};
