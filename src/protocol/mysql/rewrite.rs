//! In-flight packet mutators
//!
//! Each function inspects exactly one buffer as read from the wire. Nothing
//! here keeps state between calls; the session state machine decides which
//! mutator applies to which packet.
//!
//! Offsets include the 4-byte packet header.

use super::auth::scramble_password;
use super::packets::{
    write_payload_length, Challenge, AUTH_RESPONSE_USERNAME_OFFSET, CLIENT_SSL, COM_QUERY,
    PACKET_HEADER_LEN, PROTOCOL_VERSION_10, SCRAMBLE_PART1_LEN, SCRAMBLE_PART2_LEN,
};
use crate::config::UpstreamCredentials;

/// Offset of the server version string in HandshakeV10
const SERVER_VERSION_OFFSET: usize = PACKET_HEADER_LEN + 1;

/// Bytes between the version terminator and auth-data-part-1 (null + connection id)
const CONNECTION_ID_SPAN: usize = 1 + 4;

/// Bytes between the low capability flags and auth-data-part-2
/// (capability low 2, charset 1, status 2, capability high 2, auth length 1, reserved 10)
const CAPS_LOW_TO_PART2: usize = 2 + 1 + 2 + 2 + 1 + 10;

/// Outcome of [`rewrite_auth_response`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRewrite {
    /// Packet is too short to be a HandshakeResponse41; forwarded untouched
    TooShort,
    /// No override configured; forwarded untouched
    Passthrough,
    /// Username and auth response replaced
    Rewritten {
        /// Username the client presented
        client_user: String,
        /// Packet length before the splice
        original_len: usize,
        /// Packet length after the splice
        rewritten_len: usize,
    },
    /// Username terminator or auth-response length out of range; forwarded untouched
    Unparseable,
}

impl AuthRewrite {
    /// Whether the authentication phase is over for this session
    pub fn completes_auth(&self) -> bool {
        matches!(self, Self::Passthrough | Self::Rewritten { .. })
    }
}

/// Clear `CLIENT_SSL` in a HandshakeV10 greeting and capture its challenge.
///
/// The packet length never changes. Returns `None` and leaves the buffer
/// untouched when the greeting cannot be parsed far enough to reach the low
/// capability flags (wrong protocol version, missing version terminator,
/// truncated packet).
pub fn rewrite_handshake(packet: &mut [u8]) -> Option<Challenge> {
    if packet.len() <= SERVER_VERSION_OFFSET || packet[PACKET_HEADER_LEN] != PROTOCOL_VERSION_10 {
        return None;
    }

    let version_len = packet[SERVER_VERSION_OFFSET..]
        .iter()
        .position(|&b| b == 0)?;
    let part1_start = SERVER_VERSION_OFFSET + version_len + CONNECTION_ID_SPAN;
    let caps_low_start = part1_start + SCRAMBLE_PART1_LEN + 1;
    if packet.len() < caps_low_start + 2 {
        return None;
    }

    let caps_low = u16::from_le_bytes([packet[caps_low_start], packet[caps_low_start + 1]]);
    let caps_low = caps_low & !(CLIENT_SSL as u16);
    packet[caps_low_start..caps_low_start + 2].copy_from_slice(&caps_low.to_le_bytes());

    let mut challenge = packet[part1_start..part1_start + SCRAMBLE_PART1_LEN].to_vec();
    let part2_start = caps_low_start + CAPS_LOW_TO_PART2;
    if packet.len() >= part2_start + SCRAMBLE_PART2_LEN {
        challenge.extend_from_slice(&packet[part2_start..part2_start + SCRAMBLE_PART2_LEN]);
    }

    Some(Challenge::new(challenge))
}

/// Replace the username and auth response of a HandshakeResponse41.
///
/// `[username, 0x00, len, auth-response]` starting at offset 36 is spliced
/// out and replaced with the override username and a fresh
/// `mysql_native_password` response computed over `challenge`. Everything
/// after the original auth response (database, plugin name, attributes) is
/// kept byte for byte and the header length is recomputed.
pub fn rewrite_auth_response(
    packet: &mut Vec<u8>,
    credentials: Option<&UpstreamCredentials>,
    challenge: &Challenge,
) -> AuthRewrite {
    if packet.len() <= AUTH_RESPONSE_USERNAME_OFFSET {
        return AuthRewrite::TooShort;
    }
    let Some(credentials) = credentials else {
        return AuthRewrite::Passthrough;
    };

    let Some(user_len) = packet[AUTH_RESPONSE_USERNAME_OFFSET..]
        .iter()
        .position(|&b| b == 0)
    else {
        return AuthRewrite::Unparseable;
    };
    let user_end = AUTH_RESPONSE_USERNAME_OFFSET + user_len;
    let len_pos = user_end + 1;
    if len_pos >= packet.len() {
        return AuthRewrite::Unparseable;
    }
    let auth_end = len_pos + 1 + packet[len_pos] as usize;
    if auth_end > packet.len() {
        return AuthRewrite::Unparseable;
    }

    let client_user =
        String::from_utf8_lossy(&packet[AUTH_RESPONSE_USERNAME_OFFSET..user_end]).into_owned();
    let response = scramble_password(challenge.as_bytes(), credentials.password.as_bytes());

    let mut replacement = Vec::with_capacity(credentials.username.len() + 2 + response.len());
    replacement.extend_from_slice(credentials.username.as_bytes());
    replacement.push(0);
    replacement.push(response.len() as u8);
    replacement.extend_from_slice(&response);

    let original_len = packet.len();
    packet.splice(AUTH_RESPONSE_USERNAME_OFFSET..auth_end, replacement);
    let payload_len = (packet.len() - PACKET_HEADER_LEN) as u32;
    write_payload_length(packet, payload_len);

    AuthRewrite::Rewritten {
        client_user,
        original_len,
        rewritten_len: packet.len(),
    }
}

/// Extract the query text from a `COM_QUERY` packet.
///
/// Any other command, or a buffer too short to carry a command byte,
/// yields `None`. Invalid UTF-8 is replaced rather than rejected.
pub fn observe_query(packet: &[u8]) -> Option<String> {
    if packet.len() <= PACKET_HEADER_LEN || packet[PACKET_HEADER_LEN] != COM_QUERY {
        return None;
    }
    Some(String::from_utf8_lossy(&packet[PACKET_HEADER_LEN + 1..]).into_owned())
}
