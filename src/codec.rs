//! Conversions between field values and their little-endian wire bytes.

use crate::error::{Error, Result};

/// Encode a value as an IEEE-754 single, little-endian.
pub fn encode_f32(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode the first four bytes as a little-endian IEEE-754 single.
pub fn decode_f32(bytes: &[u8]) -> Result<f32> {
    match bytes.first_chunk::<4>() {
        Some(raw) => Ok(f32::from_le_bytes(*raw)),
        None => Err(Error::MalformedPayload {
            needed: 4,
            available: bytes.len(),
        }),
    }
}

/// Decode the first byte.
pub fn decode_u8(bytes: &[u8]) -> Result<u8> {
    bytes.first().copied().ok_or(Error::MalformedPayload {
        needed: 1,
        available: 0,
    })
}

/// Interpret bytes as text, dropping NULs and surrounding whitespace.
///
/// The device pads its identity strings with zeros.
pub fn decode_text(bytes: &[u8]) -> String {
    let cleaned: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&cleaned).trim().to_string()
}

/// Frame checksum: `(type_code + len(payload) + sum(payload)) mod 256`.
///
/// Header and command bytes are not part of the sum.
pub fn checksum(type_code: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(type_code.wrapping_add(payload.len() as u8), |acc, b| {
            acc.wrapping_add(*b)
        })
}
