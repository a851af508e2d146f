//! Per-connection protocol state machine
//!
//! Both relay pumps feed every buffer they read through
//! [`SessionState::advance`], which picks the mutator for the current phase
//! and direction. The state lives behind a mutex shared by the two pumps,
//! so transitions are serialized:
//!
//! | phase                   | from server           | from client         |
//! |-------------------------|-----------------------|---------------------|
//! | AwaitingServerHandshake | greeting rewrite      | forward             |
//! | AwaitingClientAuth      | forward               | auth rewrite        |
//! | Established             | forward               | query observer      |
//! | Closed                  | stop                  | stop                |

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::config::CredentialOverride;
use crate::protocol::mysql::{
    observe_query, rewrite_auth_response, rewrite_handshake, AuthRewrite, Challenge,
};
use crate::query_logging::{QueryObserver, SessionContext};

/// Session phase. Only ever moves forward; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the server greeting
    AwaitingServerHandshake,
    /// Greeting forwarded; waiting for the client's handshake response
    AwaitingClientAuth,
    /// Authentication relayed; observing commands
    Established,
    /// Torn down
    Closed,
}

/// Which peer a buffer was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read from the upstream server, headed to the client
    FromServer,
    /// Read from the client, headed upstream
    FromClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromServer => f.write_str("server->client"),
            Self::FromClient => f.write_str("client->server"),
        }
    }
}

/// What a pump does with a buffer after [`SessionState::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write the (possibly rewritten) buffer to the peer
    Forward,
    /// Session is closed; exit the pump
    Stop,
}

/// State shared by the two pumps of one session
pub type SharedState = Arc<Mutex<SessionState>>;

/// A query picked up by [`SessionState::advance`], waiting to be handed to
/// the observer once the state lock is released
pub struct ObservedQuery {
    observer: Arc<dyn QueryObserver>,
    context: SessionContext,
    query: String,
}

impl ObservedQuery {
    /// Hand the query to the session's observer
    pub fn deliver(self) {
        self.observer.observe(&self.context, &self.query);
    }
}

/// Advance the shared state for one buffer.
///
/// The lock covers only the transition. An observed query is delivered after
/// the guard is dropped, so a slow observer never stalls the other pump.
pub fn advance_shared(state: &SharedState, direction: Direction, packet: &mut Vec<u8>) -> Action {
    let (action, observed) = {
        let mut state = state.lock();
        let action = state.advance(direction, packet);
        (action, state.take_observed())
    };
    if let Some(observed) = observed {
        observed.deliver();
    }
    action
}

/// Phase, captured challenge and collaborators for one client connection
pub struct SessionState {
    phase: Phase,
    challenge: Challenge,
    settings: Arc<CredentialOverride>,
    observer: Arc<dyn QueryObserver>,
    context: SessionContext,
    observed: Option<ObservedQuery>,
}

impl SessionState {
    /// Fresh state for a just-dialed session
    pub fn new(
        settings: Arc<CredentialOverride>,
        observer: Arc<dyn QueryObserver>,
        context: SessionContext,
    ) -> Self {
        Self {
            phase: Phase::AwaitingServerHandshake,
            challenge: Challenge::default(),
            settings,
            observer,
            context,
            observed: None,
        }
    }

    /// Wrap for sharing between pumps
    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Challenge captured from the server greeting (empty until then)
    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Session identity used in logs and audit entries
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Route one buffer through the mutator for the current phase.
    ///
    /// `packet` may grow or shrink; its length afterwards is what gets
    /// forwarded.
    pub fn advance(&mut self, direction: Direction, packet: &mut Vec<u8>) -> Action {
        match (self.phase, direction) {
            (Phase::Closed, _) => return Action::Stop,
            (Phase::AwaitingServerHandshake, Direction::FromServer) => {
                self.on_server_greeting(packet)
            }
            (Phase::AwaitingClientAuth, Direction::FromClient) => self.on_client_auth(packet),
            (Phase::Established, Direction::FromClient) => self.on_client_command(packet),
            (Phase::AwaitingServerHandshake, Direction::FromClient)
            | (Phase::AwaitingClientAuth, Direction::FromServer)
            | (Phase::Established, Direction::FromServer) => {}
        }
        Action::Forward
    }

    /// Take the query observed by the last [`advance`](Self::advance), if any
    pub fn take_observed(&mut self) -> Option<ObservedQuery> {
        self.observed.take()
    }

    /// Mark the session closed.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&mut self) -> bool {
        if self.phase == Phase::Closed {
            return false;
        }
        self.set_phase(Phase::Closed);
        true
    }

    fn set_phase(&mut self, next: Phase) {
        debug!(
            session_id = %self.context.session_id,
            "Phase {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
    }

    fn on_server_greeting(&mut self, packet: &mut [u8]) {
        match rewrite_handshake(packet) {
            Some(challenge) => {
                debug!(
                    session_id = %self.context.session_id,
                    "Server greeting: CLIENT_SSL cleared, captured {}-byte challenge",
                    challenge.len()
                );
                self.challenge = challenge;
                self.set_phase(Phase::AwaitingClientAuth);
            }
            None => {
                warn!(
                    session_id = %self.context.session_id,
                    "Unparseable server greeting ({} bytes), forwarded unchanged",
                    packet.len()
                );
            }
        }
    }

    fn on_client_auth(&mut self, packet: &mut Vec<u8>) {
        let settings = Arc::clone(&self.settings);
        let credentials = settings.credentials.as_ref();

        match rewrite_auth_response(packet, credentials, &self.challenge) {
            AuthRewrite::TooShort => {
                debug!(
                    session_id = %self.context.session_id,
                    "Client packet too short for a handshake response ({} bytes)",
                    packet.len()
                );
            }
            AuthRewrite::Unparseable => {
                warn!(
                    session_id = %self.context.session_id,
                    "Unparseable handshake response ({} bytes), forwarded unchanged",
                    packet.len()
                );
            }
            AuthRewrite::Passthrough => {
                debug!(
                    session_id = %self.context.session_id,
                    "No credential override, relaying authentication unchanged"
                );
                self.set_phase(Phase::Established);
            }
            AuthRewrite::Rewritten {
                client_user,
                original_len,
                rewritten_len,
            } => {
                let upstream_user = credentials.map(|c| c.username.clone());
                if credentials.is_some_and(|c| !c.password.is_empty())
                    && !self.challenge.is_complete()
                {
                    warn!(
                        session_id = %self.context.session_id,
                        "Scrambled password over a {}-byte challenge; upstream will likely reject it",
                        self.challenge.len()
                    );
                }
                info!(
                    session_id = %self.context.session_id,
                    "Client user '{}' authenticating upstream as '{}'",
                    client_user,
                    upstream_user.as_deref().unwrap_or_default()
                );
                debug!(
                    session_id = %self.context.session_id,
                    "Handshake response rewritten ({} -> {} bytes)",
                    original_len,
                    rewritten_len
                );
                self.context.client_user = Some(client_user);
                self.context.upstream_user = upstream_user;
                self.set_phase(Phase::Established);
            }
        }
    }

    fn on_client_command(&mut self, packet: &[u8]) {
        if let Some(query) = observe_query(packet) {
            self.observed = Some(ObservedQuery {
                observer: Arc::clone(&self.observer),
                context: self.context.clone(),
                query,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamCredentials;
    use crate::protocol::mysql::{
        build_packet, payload_length, scramble_password, CLIENT_SSL, COM_PING,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;
    use std::time::Duration;
    use zeroize::Zeroizing;

    #[derive(Default)]
    struct RecordingObserver {
        queries: parking_lot::Mutex<Vec<String>>,
    }

    impl QueryObserver for RecordingObserver {
        fn observe(&self, _context: &SessionContext, query: &str) {
            self.queries.lock().push(query.to_string());
        }
    }

    fn settings(credentials: Option<(&str, &str)>) -> Arc<CredentialOverride> {
        Arc::new(CredentialOverride {
            upstream_address: "127.0.0.1:3306".to_string(),
            connect_timeout: Duration::from_secs(1),
            credentials: credentials.map(|(user, password)| UpstreamCredentials {
                username: user.to_string(),
                password: Zeroizing::new(password.to_string()),
            }),
        })
    }

    fn state_with(credentials: Option<(&str, &str)>) -> (SessionState, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let state = SessionState::new(
            settings(credentials),
            observer.clone(),
            SessionContext::new("127.0.0.1:50000", "127.0.0.1:3306"),
        );
        (state, observer)
    }

    fn greeting() -> Vec<u8> {
        let mut payload = vec![10];
        payload.extend_from_slice(b"8.0.36\0");
        payload.extend_from_slice(&[7, 0, 0, 0]);
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        payload.push(0);
        payload.extend_from_slice(&[0xff, 0xff]);
        payload.push(0xff);
        payload.extend_from_slice(&[2, 0]);
        payload.extend_from_slice(&[0xff, 0xdf]);
        payload.push(21);
        payload.extend_from_slice(&[0; 10]);
        payload.extend_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 0]);
        payload.extend_from_slice(b"mysql_native_password\0");
        build_packet(0, &payload)
    }

    fn auth_response(user: &str) -> Vec<u8> {
        let mut payload = vec![0x8d, 0xa6, 0x0f, 0x00];
        payload.extend_from_slice(&[0, 0, 0, 1]);
        payload.push(0x21);
        payload.extend_from_slice(&[0; 23]);
        payload.extend_from_slice(user.as_bytes());
        payload.push(0);
        payload.push(20);
        payload.extend_from_slice(&[0x55; 20]);
        payload.extend_from_slice(b"mysql_native_password\0");
        build_packet(1, &payload)
    }

    #[test]
    fn test_initial_state() {
        let (state, _) = state_with(None);
        assert_eq!(state.phase(), Phase::AwaitingServerHandshake);
        assert!(state.challenge().is_empty());
    }

    #[test]
    fn test_client_bytes_before_greeting_forwarded() {
        let (mut state, _) = state_with(Some(("bob", "secret")));
        let mut packet = auth_response("alice");
        let original = packet.clone();

        assert_eq!(state.advance(Direction::FromClient, &mut packet), Action::Forward);
        assert_eq!(packet, original);
        assert_eq!(state.phase(), Phase::AwaitingServerHandshake);
    }

    #[test]
    fn test_greeting_advances_and_captures_challenge() {
        let (mut state, _) = state_with(None);
        let mut packet = greeting();

        assert_eq!(state.advance(Direction::FromServer, &mut packet), Action::Forward);
        assert_eq!(state.phase(), Phase::AwaitingClientAuth);
        assert_eq!(state.challenge().as_bytes(), &(1..=20).collect::<Vec<u8>>()[..]);
        assert_eq!(packet[26] & (CLIENT_SSL >> 8) as u8, 0);
    }

    #[test]
    fn test_unparseable_greeting_keeps_phase() {
        let (mut state, _) = state_with(None);
        let mut packet = build_packet(0, b"\xff\x15\x04#28000Access denied");
        let original = packet.clone();

        state.advance(Direction::FromServer, &mut packet);
        assert_eq!(packet, original);
        assert_eq!(state.phase(), Phase::AwaitingServerHandshake);
    }

    #[test]
    fn test_server_bytes_during_auth_forwarded() {
        let (mut state, _) = state_with(None);
        state.advance(Direction::FromServer, &mut greeting());

        let mut packet = greeting();
        let original = packet.clone();
        state.advance(Direction::FromServer, &mut packet);
        assert_eq!(packet, original);
        assert_eq!(state.phase(), Phase::AwaitingClientAuth);
    }

    #[test]
    fn test_auth_rewrite_with_override() {
        let (mut state, _) = state_with(Some(("bob", "secret")));
        state.advance(Direction::FromServer, &mut greeting());

        let mut packet = auth_response("alice");
        state.advance(Direction::FromClient, &mut packet);

        assert_eq!(state.phase(), Phase::Established);
        assert_eq!(&packet[36..40], b"bob\0");
        let challenge: Vec<u8> = (1..=20).collect();
        assert_eq!(&packet[41..61], scramble_password(&challenge, b"secret").as_slice());
        assert_eq!(payload_length(&packet), Some((packet.len() - 4) as u32));
        assert_eq!(state.context().client_user.as_deref(), Some("alice"));
        assert_eq!(state.context().upstream_user.as_deref(), Some("bob"));
    }

    #[test]
    fn test_auth_without_override_is_transparent() {
        let (mut state, _) = state_with(None);
        state.advance(Direction::FromServer, &mut greeting());

        let mut packet = auth_response("alice");
        let original = packet.clone();
        state.advance(Direction::FromClient, &mut packet);

        assert_eq!(packet, original);
        assert_eq!(state.phase(), Phase::Established);
    }

    #[test]
    fn test_short_client_packet_keeps_auth_phase() {
        let (mut state, _) = state_with(Some(("bob", "secret")));
        state.advance(Direction::FromServer, &mut greeting());

        // SSLRequest-sized packet
        let mut packet = build_packet(1, &[0u8; 32]);
        let original = packet.clone();
        state.advance(Direction::FromClient, &mut packet);

        assert_eq!(packet, original);
        assert_eq!(state.phase(), Phase::AwaitingClientAuth);
    }

    #[test]
    fn test_established_observes_queries() {
        let (mut state, observer) = state_with(None);
        state.advance(Direction::FromServer, &mut greeting());
        state.advance(Direction::FromClient, &mut auth_response("alice"));
        let shared = state.shared();

        let mut query = build_packet(0, b"\x03SELECT 1");
        let original = query.clone();
        assert_eq!(
            advance_shared(&shared, Direction::FromClient, &mut query),
            Action::Forward
        );
        assert_eq!(query, original);

        advance_shared(&shared, Direction::FromClient, &mut build_packet(0, &[COM_PING]));

        assert_eq!(*observer.queries.lock(), vec!["SELECT 1".to_string()]);
        assert!(shared.lock().take_observed().is_none());
    }

    #[test]
    fn test_advance_defers_observer_to_caller() {
        let (mut state, observer) = state_with(None);
        state.advance(Direction::FromServer, &mut greeting());
        state.advance(Direction::FromClient, &mut auth_response("alice"));

        state.advance(Direction::FromClient, &mut build_packet(0, b"\x03SELECT 2"));
        assert!(observer.queries.lock().is_empty());

        let observed = state.take_observed().unwrap();
        observed.deliver();
        assert_eq!(*observer.queries.lock(), vec!["SELECT 2".to_string()]);
    }

    /// Records whether the session lock was free while observing
    #[derive(Default)]
    struct LockCheckingObserver {
        state: OnceLock<SharedState>,
        lock_was_free: AtomicBool,
    }

    impl QueryObserver for LockCheckingObserver {
        fn observe(&self, _context: &SessionContext, _query: &str) {
            if let Some(state) = self.state.get() {
                let free = state.try_lock().is_some();
                self.lock_was_free.store(free, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_observer_runs_without_session_lock() {
        let observer = Arc::new(LockCheckingObserver::default());
        let mut state = SessionState::new(
            settings(None),
            observer.clone(),
            SessionContext::new("127.0.0.1:50000", "127.0.0.1:3306"),
        );
        state.advance(Direction::FromServer, &mut greeting());
        state.advance(Direction::FromClient, &mut auth_response("alice"));
        let shared = state.shared();
        assert!(observer.state.set(Arc::clone(&shared)).is_ok());

        advance_shared(&shared, Direction::FromClient, &mut build_packet(0, b"\x03SELECT 1"));

        assert!(observer.lock_was_free.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queries_not_observed_before_established() {
        let (mut state, observer) = state_with(None);
        state.advance(Direction::FromClient, &mut build_packet(0, b"\x03SELECT 1"));
        assert!(observer.queries.lock().is_empty());
    }

    #[test]
    fn test_close_is_idempotent_and_terminal() {
        let (mut state, _) = state_with(None);
        assert!(state.close());
        assert!(!state.close());
        assert_eq!(state.phase(), Phase::Closed);

        let mut packet = greeting();
        assert_eq!(state.advance(Direction::FromServer, &mut packet), Action::Stop);
        assert_eq!(state.advance(Direction::FromClient, &mut packet), Action::Stop);
        assert_eq!(state.phase(), Phase::Closed);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::FromClient.to_string(), "client->server");
        assert_eq!(Direction::FromServer.to_string(), "server->client");
    }
}
