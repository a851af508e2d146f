//! MySQL packet layout constants and header helpers
//!
//! Every MySQL packet starts with a 4-byte header: a 3-byte little-endian
//! payload length followed by a 1-byte sequence id.
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html>

/// Size of the packet header (payload length + sequence id)
pub const PACKET_HEADER_LEN: usize = 4;

/// Maximum payload size (2^24 - 1)
pub const MAX_PAYLOAD_LENGTH: u32 = 0xFF_FF_FF;

/// Protocol version carried by every modern server greeting
pub const PROTOCOL_VERSION_10: u8 = 10;

/// Full length of the native password challenge
pub const SCRAMBLE_LEN: usize = 20;

/// Auth data carried before the capability flags in HandshakeV10
pub const SCRAMBLE_PART1_LEN: usize = 8;

/// Auth data carried after the reserved bytes in HandshakeV10
pub const SCRAMBLE_PART2_LEN: usize = SCRAMBLE_LEN - SCRAMBLE_PART1_LEN;

/// Offset of the username in HandshakeResponse41 (header + 32-byte fixed region)
pub const AUTH_RESPONSE_USERNAME_OFFSET: usize = PACKET_HEADER_LEN + 32;

// ============================================================================
// Capability Flags
// ============================================================================

/// New 4.1 protocol
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
/// Switch to SSL after sending the capability flags
pub const CLIENT_SSL: u32 = 0x0000_0800;
/// 4.1 native authentication
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
/// Client supports authentication plugins
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;

// ============================================================================
// Command Bytes
// ============================================================================

/// Text protocol query
pub const COM_QUERY: u8 = 0x03;

/// Ping the server
pub const COM_PING: u8 = 0x0e;

/// Read the payload length from a packet header.
///
/// Returns `None` if the buffer is shorter than a header.
pub fn payload_length(packet: &[u8]) -> Option<u32> {
    if packet.len() < PACKET_HEADER_LEN {
        return None;
    }
    Some(u32::from(packet[0]) | u32::from(packet[1]) << 8 | u32::from(packet[2]) << 16)
}

/// Overwrite the 3-byte payload length in a packet header.
///
/// The caller guarantees the buffer holds at least a header and that
/// `len` fits in 24 bits.
pub fn write_payload_length(packet: &mut [u8], len: u32) {
    debug_assert!(len <= MAX_PAYLOAD_LENGTH);
    packet[0] = (len & 0xFF) as u8;
    packet[1] = ((len >> 8) & 0xFF) as u8;
    packet[2] = ((len >> 16) & 0xFF) as u8;
}

/// Frame a payload with a packet header
pub fn build_packet(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PACKET_HEADER_LEN + payload.len());
    packet.extend_from_slice(&[0, 0, 0, sequence_id]);
    packet.extend_from_slice(payload);
    write_payload_length(&mut packet, payload.len() as u32);
    packet
}

/// The challenge ("scramble") a server hands out in its greeting.
///
/// Holds 20 bytes when the greeting carried both auth-data fragments and
/// only the first 8 when it did not. The missing tail is never padded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    bytes: Vec<u8>,
}

impl Challenge {
    /// Wrap raw challenge bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Challenge bytes as captured
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of captured bytes (0, 8 or 20)
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True until a greeting has been captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when both fragments were captured
    pub fn is_complete(&self) -> bool {
        self.bytes.len() == SCRAMBLE_LEN
    }
}
