//! Node IPC framing.
//!
//! Request: `'N'`, encoding, two reserved bytes, big-endian u32 length, payload.
//! Reply: big-endian u32 length, payload.

use bytes::{BufMut, BytesMut};

use super::IpcError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const PREAMBLE_LEAD: u8 = b'N';
pub const ENCODING_JSON_V1: u8 = 0x01;
pub const PREAMBLE: [u8; 4] = [PREAMBLE_LEAD, ENCODING_JSON_V1, 0, 0];

pub const LEN_PREFIX: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

// -----------------------------------------------------------------------------
// ----- Encode ----------------------------------------------------------------

pub fn encode_request(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(PREAMBLE.len() + LEN_PREFIX + payload.len());
    buf.extend_from_slice(&PREAMBLE);
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

pub fn encode_reply(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

// -----------------------------------------------------------------------------
// ----- Peek ------------------------------------------------------------------

/// Total length (prefix included) of the reply at the front of `buf`, or
/// `None` while the reply is still incomplete.
pub fn peek_reply(buf: &[u8]) -> Result<Option<usize>, IpcError> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(IpcError::protocol(format!(
            "reply length {len} exceeds limit of {MAX_PAYLOAD_LEN}"
        )));
    }

    let total = LEN_PREFIX + len;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some(total))
}

/// Total length of the request at the front of `buf`; the node-side
/// counterpart of [`peek_reply`].
pub fn peek_request(buf: &[u8]) -> Result<Option<usize>, IpcError> {
    if buf.len() < PREAMBLE.len() {
        return Ok(None);
    }

    if buf[0] != PREAMBLE_LEAD {
        return Err(IpcError::protocol(format!(
            "bad preamble lead byte 0x{:02x}",
            buf[0]
        )));
    }

    if buf[1] != ENCODING_JSON_V1 {
        return Err(IpcError::protocol(format!(
            "unsupported payload encoding 0x{:02x}",
            buf[1]
        )));
    }

    Ok(peek_reply(&buf[PREAMBLE.len()..])?.map(|total| PREAMBLE.len() + total))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
