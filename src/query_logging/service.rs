//! Background query audit writer.
//!
//! Receives [`QueryLog`] entries via a bounded mpsc channel and appends them
//! to a file as JSON Lines.
//!
//! - Callers use `try_send()` so a slow disk never stalls a relay pump.
//! - A blocking task drains the channel and owns the file handle.
//! - The task exits once every sender is dropped or `shutdown()` is called.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::config::QueryLoggingConfig;
use super::log_entry::QueryLog;

/// Channel buffer size for log entries.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Handle for submitting log entries to the background service.
#[derive(Clone)]
pub struct QueryLogSender {
    tx: mpsc::Sender<LogMessage>,
}

/// Messages sent to the background logging service.
enum LogMessage {
    /// A query log entry to record.
    Entry(Box<QueryLog>),
    /// Signal to shut down the service.
    Shutdown,
}

impl QueryLogSender {
    /// Submit a log entry without blocking.
    ///
    /// Returns `false` if the channel is full or the service has shut down.
    /// Dropped entries are not retried.
    pub fn try_send(&self, entry: QueryLog) -> bool {
        self.tx.try_send(LogMessage::Entry(Box::new(entry))).is_ok()
    }

    /// Signal the background service to shut down gracefully.
    pub async fn shutdown(self) {
        let _ = self.tx.send(LogMessage::Shutdown).await;
    }
}

/// Background query logging service.
pub struct QueryLoggingService;

impl QueryLoggingService {
    /// Start the logging service and return a sender for submitting entries.
    ///
    /// Returns `None` if logging is disabled, no output path is configured,
    /// or the file cannot be opened. Must be called inside a tokio runtime.
    pub fn start(config: &QueryLoggingConfig) -> Option<QueryLogSender> {
        if !config.enabled {
            return None;
        }

        let output_path = config.output_path.as_ref()?;

        let writer = match JsonLinesWriter::open(Path::new(output_path)) {
            Ok(w) => w,
            Err(e) => {
                error!("Failed to open query log {}: {}", output_path, e);
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        tokio::task::spawn_blocking(move || {
            run_logging_task(rx, writer);
        });

        Some(QueryLogSender { tx })
    }
}

/// Appends QueryLog entries as JSON Lines.
///
/// Writes go straight to the file, one `write_all` per line, so each entry
/// is on disk as soon as the task handles it. After a write fails the writer
/// goes inactive and drops later entries instead of failing every session
/// that logs a query.
struct JsonLinesWriter {
    file: std::fs::File,
    path: PathBuf,
    active: bool,
}

impl JsonLinesWriter {
    fn open(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        debug!("Query log opened: {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            active: true,
        })
    }

    /// Write a single QueryLog entry as a JSON line.
    ///
    /// Returns Ok(()) without writing once the writer is inactive.
    fn write_entry(&mut self, entry: &QueryLog) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }

        let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
        line.push('\n');

        if let Err(e) = self.file.write_all(line.as_bytes()) {
            warn!("Query log {} disabled after write error: {}", self.path.display(), e);
            self.active = false;
            return Err(e);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        if let Err(e) = self.file.flush() {
            warn!("Query log {} disabled after flush error: {}", self.path.display(), e);
            self.active = false;
            return Err(e);
        }
        Ok(())
    }
}

/// Drains the channel on the blocking thread pool so file I/O never runs
/// on an async worker.
fn run_logging_task(mut rx: mpsc::Receiver<LogMessage>, mut writer: JsonLinesWriter) {
    debug!("Query logging service started");

    let mut entry_count: u64 = 0;

    loop {
        match rx.blocking_recv() {
            Some(LogMessage::Entry(entry)) => {
                if let Err(e) = writer.write_entry(&entry) {
                    debug!("Query log entry dropped: {}", e);
                }
                entry_count += 1;
            }
            Some(LogMessage::Shutdown) | None => {
                debug!(
                    "Query logging service shutting down ({} entries)",
                    entry_count
                );
                let _ = writer.flush();
                break;
            }
        }
    }
}
