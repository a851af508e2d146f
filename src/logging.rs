//! Logging macros that set target to "mysqlproxy" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g., "mysqlproxy::server::session::relay") in every formatted line.
//! These macros ensure all logs from this crate use a single "mysqlproxy" target,
//! so `RUST_LOG=mysqlproxy=debug` selects the whole crate.

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "mysqlproxy", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "mysqlproxy", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "mysqlproxy", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "mysqlproxy", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "mysqlproxy", $($arg)*) };
}
