//! Session relay for bidirectional traffic forwarding
//!
//! Each direction runs in its own task. Every read is passed through the
//! shared [`SessionState`] before it is written to the other side. When
//! either task ends, the session is closed and the other task is aborted,
//! which drops every stream half and closes both connections.

use std::fmt;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;

use super::state::{advance_shared, Action, Direction, SessionState, SharedState};

/// Fixed read buffer per direction. Packets larger than one read are
/// forwarded in pieces and never reassembled.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client closed connection.
    ClientDisconnect,

    /// Server closed connection.
    ServerDisconnect,

    /// I/O error during relay.
    IoError(String),

    /// Session was already marked closed.
    Closed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnect => f.write_str("client disconnected"),
            Self::ServerDisconnect => f.write_str("server disconnected"),
            Self::IoError(e) => write!(f, "I/O error: {}", e),
            Self::Closed => f.write_str("session closed"),
        }
    }
}

/// How a single pump finished
#[derive(Debug)]
enum PumpExit {
    Eof,
    Stopped,
    Io(std::io::Error),
}

/// A relay session between client and server
pub struct Session<C, S> {
    /// Client stream
    client: C,
    /// Server stream
    server: S,
    /// Protocol state shared by both directions
    state: SharedState,
}

impl<C, S> Session<C, S>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a relay session over already-connected streams
    pub fn new(client: C, server: S, state: SessionState) -> Self {
        Self {
            client,
            server,
            state: state.shared(),
        }
    }

    /// Handle to the session state, e.g. to inspect the phase from outside
    pub fn state(&self) -> SharedState {
        SharedState::clone(&self.state)
    }

    /// Run the bidirectional relay until either side ends.
    ///
    /// # Returns
    ///
    /// The reason the first direction stopped.
    pub async fn relay(self) -> DisconnectReason {
        let session_id = self.state.lock().context().session_id.clone();
        debug!(session_id = %session_id, "Starting relay");

        let (client_read, client_write) = split(self.client);
        let (server_read, server_write) = split(self.server);

        let mut client_to_server = tokio::spawn(pump(
            client_read,
            server_write,
            Direction::FromClient,
            SharedState::clone(&self.state),
        ));
        let mut server_to_client = tokio::spawn(pump(
            server_read,
            client_write,
            Direction::FromServer,
            SharedState::clone(&self.state),
        ));

        let (finished, result) = tokio::select! {
            result = &mut client_to_server => (Direction::FromClient, result),
            result = &mut server_to_client => (Direction::FromServer, result),
        };
        let reason = disconnect_reason(finished, result);
        let other = match finished {
            Direction::FromClient => server_to_client,
            Direction::FromServer => client_to_server,
        };

        if self.state.lock().close() {
            info!(session_id = %session_id, "stop proxy: {}", reason);
        }
        other.abort();
        // Wait for the aborted pump so its stream halves are dropped
        let _ = other.await;

        debug!(session_id = %session_id, reason = ?reason, "Relay ended");
        reason
    }
}

fn disconnect_reason(
    direction: Direction,
    result: std::result::Result<PumpExit, JoinError>,
) -> DisconnectReason {
    match result {
        Ok(PumpExit::Eof) => match direction {
            Direction::FromClient => DisconnectReason::ClientDisconnect,
            Direction::FromServer => DisconnectReason::ServerDisconnect,
        },
        Ok(PumpExit::Stopped) => DisconnectReason::Closed,
        Ok(PumpExit::Io(e)) => DisconnectReason::IoError(e.to_string()),
        Err(e) => DisconnectReason::IoError(format!("{} task failed: {}", direction, e)),
    }
}

/// Copy one direction, passing every read through the state machine
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    state: SharedState,
) -> PumpExit
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut packet = Vec::with_capacity(READ_BUFFER_SIZE);
    let mut total_bytes = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("{}: EOF after {} bytes", direction, total_bytes);
                let _ = writer.shutdown().await;
                return PumpExit::Eof;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("{}: read error: {}", direction, e);
                return PumpExit::Io(e);
            }
        };
        trace!("{}: {} bytes", direction, n);

        packet.clear();
        packet.extend_from_slice(&buf[..n]);

        let action = advance_shared(&state, direction, &mut packet);
        if action == Action::Stop {
            debug!("{}: session closed, stopping", direction);
            return PumpExit::Stopped;
        }

        if let Err(e) = writer.write_all(&packet).await {
            warn!("{}: write error: {}", direction, e);
            return PumpExit::Io(e);
        }
        if let Err(e) = writer.flush().await {
            warn!("{}: flush error: {}", direction, e);
            return PumpExit::Io(e);
        }
        total_bytes += packet.len() as u64;
    }
}
