//! DDC/CI frame encoding and decoding.
//!
//! Request frame as written to slave 0x37 (the bus addressing transmits the
//! destination address 0x6E, which still participates in the checksum):
//!
//! - SOURCE (1 byte): 0x51, the host
//! - LENGTH (1 byte): payload length with the high bit set
//! - PAYLOAD (1-32 bytes): MCCS command and operands
//! - CHECKSUM (1 byte): XOR of 0x6E, SOURCE, LENGTH and all PAYLOAD bytes
//!
//! Reply frame as read back from slave 0x37:
//!
//! - SOURCE (1 byte): 0x6E, the display
//! - LENGTH (1 byte): payload length with the high bit set
//! - PAYLOAD (0-32 bytes)
//! - CHECKSUM (1 byte): XOR of 0x50 (the virtual host address), SOURCE,
//!   LENGTH and all PAYLOAD bytes
//!
//! A zero-length reply (`6E 80 BE`) is the null message: the display ACKed
//! but has nothing to say yet. An all-zero read means the same on monitors
//! that do not implement the null message properly.

use crate::error::ProtocolError;

/// Host source address in request frames.
pub const HOST_ADDR: u8 = 0x51;
/// Display address: destination of requests, source of replies.
pub const DISPLAY_ADDR: u8 = 0x6E;
/// Virtual host address folded into reply checksums.
pub const REPLY_HOST_ADDR: u8 = 0x50;
/// High bit carried by the length byte of every frame.
pub const LENGTH_FLAG: u8 = 0x80;

/// Largest payload fragment a display returns in one multi-part reply.
pub const MAX_FRAGMENT_SIZE: usize = 32;

/// MCCS command and response codes.
pub mod op {
    /// Get VCP feature request.
    pub const GET_VCP_REQUEST: u8 = 0x01;
    /// Get VCP feature reply.
    pub const GET_VCP_REPLY: u8 = 0x02;
    /// Set VCP feature.
    pub const SET_VCP: u8 = 0x03;
    /// Save current settings.
    pub const SAVE_SETTINGS: u8 = 0x0c;
    /// Table read request.
    pub const TABLE_READ_REQUEST: u8 = 0xe2;
    /// Capabilities reply fragment.
    pub const CAPABILITIES_REPLY: u8 = 0xe3;
    /// Table read reply fragment.
    pub const TABLE_READ_REPLY: u8 = 0xe4;
    /// Capabilities request.
    pub const CAPABILITIES_REQUEST: u8 = 0xf3;
}

fn checksum(init: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(init, |acc, b| acc ^ b)
}

/// Number of bytes to read for a reply carrying `payload_len` payload bytes.
pub const fn reply_len(payload_len: usize) -> usize {
    // source + length + payload + checksum
    payload_len + 3
}

/// Encode a request frame around `payload`.
pub fn encode_request(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_FRAGMENT_SIZE);
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(HOST_ADDR);
    frame.push(LENGTH_FLAG | payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(DISPLAY_ADDR, &frame));
    frame
}

/// Get VCP feature request for `feature`.
pub fn encode_get_vcp(feature: u8) -> Vec<u8> {
    encode_request(&[op::GET_VCP_REQUEST, feature])
}

/// Set VCP feature request writing `value` to `feature`.
pub fn encode_set_vcp(feature: u8, value: u16) -> Vec<u8> {
    encode_request(&[op::SET_VCP, feature, (value >> 8) as u8, value as u8])
}

/// Save current settings request.
pub fn encode_save_settings() -> Vec<u8> {
    encode_request(&[op::SAVE_SETTINGS])
}

/// Capabilities request starting at byte `offset` of the string.
pub fn encode_capabilities_request(offset: u16) -> Vec<u8> {
    encode_request(&[op::CAPABILITIES_REQUEST, (offset >> 8) as u8, offset as u8])
}

/// Table read request for `feature` starting at byte `offset`.
pub fn encode_table_read(feature: u8, offset: u16) -> Vec<u8> {
    encode_request(&[
        op::TABLE_READ_REQUEST,
        feature,
        (offset >> 8) as u8,
        offset as u8,
    ])
}

/// Encode a reply frame around `payload`.
///
/// The display side of the exchange; used by test doubles standing in for a
/// monitor.
pub fn encode_reply(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= 3 + MAX_FRAGMENT_SIZE);
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(DISPLAY_ADDR);
    frame.push(LENGTH_FLAG | payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(REPLY_HOST_ADDR, &frame));
    frame
}

/// Decode a reply frame, returning its payload.
///
/// The null message and all-zero reads decode to
/// [`ProtocolError::NotReady`]; the session treats those as a cue to poll
/// again, not as failures.
pub fn decode_reply(buf: &[u8]) -> Result<&[u8], ProtocolError> {
    if buf.iter().all(|&b| b == 0) {
        return Err(ProtocolError::NotReady);
    }
    if buf.len() < 3 {
        return Err(ProtocolError::BadFrame("reply truncated"));
    }
    if buf[0] != DISPLAY_ADDR {
        return Err(ProtocolError::BadFrame("bad reply source address"));
    }
    if buf[1] == LENGTH_FLAG {
        return Err(ProtocolError::NotReady);
    }
    if buf[1] & LENGTH_FLAG == 0 {
        return Err(ProtocolError::BadFrame("length flag missing"));
    }
    let len = (buf[1] & !LENGTH_FLAG) as usize;
    if buf.len() < reply_len(len) {
        return Err(ProtocolError::BadFrame("reply truncated"));
    }
    let expected = checksum(REPLY_HOST_ADDR, &buf[..2 + len]);
    let found = buf[2 + len];
    if expected != found {
        return Err(ProtocolError::Checksum { expected, found });
    }
    Ok(&buf[2..2 + len])
}

/// Decode a request frame, returning its payload.
///
/// The inverse of [`encode_request`]; what a display-side peer (or a test
/// double standing in for one) does with the bytes the host wrote.
pub fn decode_request(buf: &[u8]) -> Result<&[u8], ProtocolError> {
    if buf.len() < 3 {
        return Err(ProtocolError::BadFrame("request truncated"));
    }
    if buf[0] != HOST_ADDR {
        return Err(ProtocolError::BadFrame("bad request source address"));
    }
    if buf[1] & LENGTH_FLAG == 0 {
        return Err(ProtocolError::BadFrame("length flag missing"));
    }
    let len = (buf[1] & !LENGTH_FLAG) as usize;
    if buf.len() != reply_len(len) {
        return Err(ProtocolError::BadFrame("request length mismatch"));
    }
    let expected = checksum(DISPLAY_ADDR, &buf[..2 + len]);
    let found = buf[2 + len];
    if expected != found {
        return Err(ProtocolError::Checksum { expected, found });
    }
    Ok(&buf[2..2 + len])
}

/// A decoded get-VCP feature reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpReply {
    /// The display flagged the feature code as unsupported.
    pub unsupported: bool,
    /// Feature code echoed by the display.
    pub feature: u8,
    /// VCP type byte (0 = set parameter, 1 = momentary).
    pub ty: u8,
    /// Maximum value of the feature.
    pub maximum: u16,
    /// Current value of the feature.
    pub current: u16,
}

/// Interpret a reply payload as a get-VCP feature reply.
pub fn parse_vcp_reply(payload: &[u8]) -> Result<VcpReply, ProtocolError> {
    if payload.len() != 8 {
        return Err(ProtocolError::BadFrame("vcp reply payload size"));
    }
    if payload[0] != op::GET_VCP_REPLY {
        return Err(ProtocolError::BadFrame("not a vcp reply"));
    }
    Ok(VcpReply {
        unsupported: payload[1] != 0,
        feature: payload[2],
        ty: payload[3],
        maximum: u16::from_be_bytes([payload[4], payload[5]]),
        current: u16::from_be_bytes([payload[6], payload[7]]),
    })
}

/// One fragment of a multi-part (capabilities or table read) reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Byte offset this fragment starts at, echoed by the display.
    pub offset: u16,
    /// Fragment data.
    pub bytes: &'a [u8],
}

/// Interpret a reply payload as a multi-part reply fragment.
///
/// `reply_op` is the expected reply opcode ([`op::CAPABILITIES_REPLY`] or
/// [`op::TABLE_READ_REPLY`]).
pub fn parse_fragment(payload: &[u8], reply_op: u8) -> Result<Fragment, ProtocolError> {
    if payload.len() < 3 {
        return Err(ProtocolError::BadFrame("fragment payload size"));
    }
    if payload[0] != reply_op {
        return Err(ProtocolError::BadFrame("unexpected fragment opcode"));
    }
    Ok(Fragment {
        offset: u16::from_be_bytes([payload[1], payload[2]]),
        bytes: &payload[3..],
    })
}
