//! The byte stream the session talks over.
//!
//! Any pair of [embedded_io::Read] & [embedded_io::Write] halves will do. With the `serial`
//! feature, [`SerialTransport`](crate::serial::SerialTransport) provides them from a real
//! serial port.

/// A port the transport could open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortInfo {
    /// Identifier passed to [`Transport::open`], e.g. `/dev/ttyACM0` or `COM3`.
    pub name: String,
    /// Human readable description, if the platform provides one.
    pub description: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial_number: Option<String>,
}

/// Opens connections to a device.
///
/// The session never interprets port identifiers, it only passes them through.
pub trait Transport {
    /// Error returned by [`Transport::open`] and [`Transport::enumerate`].
    type Error: embedded_io::Error;
    /// Read half, moved to the session's reader thread.
    ///
    /// Reads should time out (with [`embedded_io::ErrorKind::TimedOut`]) rather than block
    /// forever, so that the reader thread can notice when the session is closing.
    type Reader: embedded_io::Read + Send + 'static;
    /// Write half.
    type Writer: embedded_io::Write + Send + 'static;

    /// Open the port. Dropping both halves closes it again.
    fn open(&mut self, port: &str) -> Result<(Self::Reader, Self::Writer), Self::Error>;

    /// List the ports which could be opened.
    fn enumerate(&self) -> Result<Vec<PortInfo>, Self::Error>;
}
