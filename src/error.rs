//! Our error types for the DPS PSUs.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a byte range could not be turned into a [`Frame`](crate::frame::Frame).
///
/// [`FrameError::Truncated`] means "wait for more bytes". Every other variant means the
/// bytes are garbage and the frame should be dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("Unexpected header byte {0:#04x}")]
    HeaderMismatch(u8),
    #[error("Checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },
    #[error("Payload of {0} bytes does not fit in a frame")]
    PayloadTooLong(usize),
}

impl FrameError {
    /// True when the frame was rejected outright rather than merely incomplete.
    pub fn is_rejected(&self) -> bool {
        !matches!(self, FrameError::Truncated { .. })
    }
}

/// Custom error type for DPS PSU communications.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Malformed payload: need {needed} bytes, have {available}")]
    MalformedPayload { needed: usize, available: usize },
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Connection failure during {context}: {kind:?}")]
    ConnectionFailure {
        context: &'static str,
        kind: embedded_io::ErrorKind,
    },
    #[error("Communication timeout")]
    Timeout,
    #[error("Value {value} out of range for {field}")]
    ValueOutOfRange { field: &'static str, value: f32 },
    #[error("Session is already connected")]
    AlreadyConnected,
    #[error("Session is not connected")]
    NotConnected,
    /// A frame was sent after the link released its writer, or initialisation was cut
    /// short by the link going down.
    #[error("Session is closing")]
    SessionClosing,
    #[error("Observer failed: {0}")]
    Observer(String),
}

impl Error {
    /// Wrap a transport error, keeping only its kind.
    pub(crate) fn connection<E: embedded_io::Error>(context: &'static str, err: E) -> Self {
        Error::ConnectionFailure {
            context,
            kind: err.kind(),
        }
    }
}
