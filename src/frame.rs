//! Building and parsing single wire frames.
//!
//! ```text
//! +--------+---------+-----------+--------+-------------+----------+
//! | header | command | type code | length | payload ... | checksum |
//! +--------+---------+-----------+--------+-------------+----------+
//!    1          1          1         1       0 - 255          1
//! ```

use crate::{
    codec::checksum,
    error::FrameError,
    register::{Command, Direction},
};

/// Largest payload a frame can carry, limited by the one byte length field.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
/// Bytes surrounding the payload: header, command, type code, length and checksum.
pub const FRAME_OVERHEAD: usize = 5;
/// Largest frame on the wire.
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;

/// Payload storage, bounded by the length field.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;
/// One complete frame as raw bytes.
pub type RawFrame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// One validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command byte as received. Devices echo the request command.
    pub command: u8,
    /// Field or group this frame addresses.
    pub type_code: u8,
    pub payload: Payload,
}

impl Frame {
    /// Checksum this frame carries on the wire.
    pub fn checksum(&self) -> u8 {
        checksum(self.type_code, &self.payload)
    }
}

/// Build an outbound frame.
pub fn encode(command: Command, type_code: u8, payload: &[u8]) -> Result<RawFrame, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLong(payload.len()));
    }

    let mut frame = RawFrame::new();
    let header = [
        Direction::Request.header(),
        command.into(),
        type_code,
        payload.len() as u8,
    ];
    if frame.extend_from_slice(&header).is_err()
        || frame.extend_from_slice(payload).is_err()
        || frame.push(checksum(type_code, payload)).is_err()
    {
        return Err(FrameError::PayloadTooLong(payload.len()));
    }
    Ok(frame)
}

/// Parse one inbound frame. See [`parse`].
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    parse(bytes, Direction::Response)
}

/// Parse and validate a frame travelling in `direction`.
///
/// Trailing bytes past the checksum are ignored.
pub fn parse(bytes: &[u8], direction: Direction) -> Result<Frame, FrameError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(FrameError::Truncated {
            needed: FRAME_OVERHEAD,
            available: bytes.len(),
        });
    }
    if bytes[0] != direction.header() {
        return Err(FrameError::HeaderMismatch(bytes[0]));
    }

    let command = bytes[1];
    let type_code = bytes[2];
    let length = bytes[3] as usize;
    let needed = FRAME_OVERHEAD + length;
    if bytes.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    let payload_bytes = &bytes[4..4 + length];
    let expected = checksum(type_code, payload_bytes);
    let received = bytes[4 + length];
    if expected != received {
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    let payload = Payload::from_slice(payload_bytes)
        .map_err(|_| FrameError::PayloadTooLong(payload_bytes.len()))?;
    Ok(Frame {
        command,
        type_code,
        payload,
    })
}
