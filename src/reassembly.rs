//! Reassembly of frames from a serial byte stream.
//!
//! The transport hands us bytes in whatever chunks it likes. [`StreamBuffer`] keeps
//! them until a whole frame is available, and skips bytes which cannot start one.

use tracing::{trace, warn};

use crate::{
    frame::{FRAME_OVERHEAD, MAX_FRAME_LEN, RawFrame},
    register::RESPONSE_HEADER,
};

/// Byte position of the length field within a frame.
const LENGTH_INDEX: usize = 3;

/// Bytes the buffer can hold: one unfinished frame plus a full read behind it.
pub const BUFFER_LEN: usize = 2 * MAX_FRAME_LEN;

/// Accumulates inbound bytes and cuts them into frame sized pieces.
///
/// Only the framing is checked here. Whether an extracted frame's header and checksum are
/// valid is up to [`frame::decode`](crate::frame::decode).
#[derive(Debug, Default)]
pub struct StreamBuffer {
    bytes: heapless::Vec<u8, BUFFER_LEN>,
    discarded: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the transport and return every frame they complete.
    ///
    /// Input larger than the free space is taken in pieces, cutting frames out between
    /// pieces.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        while !data.is_empty() {
            let room = BUFFER_LEN - self.bytes.len();
            let (head, rest) = data.split_at(room.min(data.len()));
            if head.is_empty() || self.bytes.extend_from_slice(head).is_err() {
                // Extraction always leaves less than one frame behind, so this means the
                // buffer contents can never become a frame.
                warn!(len = self.bytes.len(), "stream buffer full, dropping contents");
                self.discarded += self.bytes.len();
                self.bytes.clear();
                continue;
            }
            data = rest;
            self.extract_into(&mut frames);
        }
        frames
    }

    /// Bytes waiting for the rest of their frame.
    pub fn pending(&self) -> &[u8] {
        &self.bytes
    }

    /// Total number of bytes skipped while looking for a header.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Drop everything buffered and reset the counters.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.discarded = 0;
    }

    /// Move every complete frame in the buffer into `frames`.
    fn extract_into(&mut self, frames: &mut Vec<RawFrame>) {
        let mut cursor = 0;
        let mut extracted = 0;

        while cursor < self.bytes.len() {
            if self.bytes[cursor] != RESPONSE_HEADER {
                // Cannot be a frame start, resync one byte on.
                cursor += 1;
                self.discarded += 1;
                continue;
            }

            let remaining = &self.bytes[cursor..];
            let Some(&length) = remaining.get(LENGTH_INDEX) else {
                break;
            };
            let frame_len = FRAME_OVERHEAD + length as usize;
            if remaining.len() < frame_len {
                break;
            }

            match RawFrame::from_slice(&remaining[..frame_len]) {
                Ok(frame) => {
                    frames.push(frame);
                    extracted += 1;
                }
                Err(_) => self.discarded += frame_len,
            }
            cursor += frame_len;
        }

        if cursor > 0 {
            trace!(consumed = cursor, frames = extracted, "stream buffer advanced");
            let kept = self.bytes.len() - cursor;
            self.bytes.copy_within(cursor.., 0);
            self.bytes.truncate(kept);
        }
    }
}
