//! [`Transport`] over a serial port, using the `serialport` crate.

use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use thiserror::Error;

use crate::{
    register::BaudRate,
    transport::{PortInfo, Transport},
};

/// An I/O error from the serial port, usable as an [`embedded_io::Error`].
#[derive(Error, Debug)]
#[error(transparent)]
pub struct IoError(#[from] pub std::io::Error);

impl From<serialport::Error> for IoError {
    fn from(err: serialport::Error) -> Self {
        IoError(err.into())
    }
}

/// The kinds a serial port reports. Anything else is [`embedded_io::ErrorKind::Other`].
fn port_error_kind(kind: std::io::ErrorKind) -> embedded_io::ErrorKind {
    use embedded_io::ErrorKind as Kind;
    use std::io::ErrorKind as Io;
    match kind {
        Io::NotFound => Kind::NotFound,
        Io::PermissionDenied => Kind::PermissionDenied,
        Io::TimedOut => Kind::TimedOut,
        Io::Interrupted => Kind::Interrupted,
        Io::BrokenPipe => Kind::BrokenPipe,
        Io::InvalidInput => Kind::InvalidInput,
        Io::Unsupported => Kind::Unsupported,
        _ => Kind::Other,
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        port_error_kind(self.0.kind())
    }
}

/// One half of an open serial port.
pub struct SerialPortIo(Box<dyn SerialPort>);

impl embedded_io::ErrorType for SerialPortIo {
    type Error = IoError;
}

impl embedded_io::Read for SerialPortIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for SerialPortIo {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

/// Opens serial ports at a fixed baud rate, 8N1.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    baud_rate: BaudRate,
    /// Read timeout. The PSU can take a while to respond, but the reader thread also uses
    /// this to check for shutdown, so keep it short-ish.
    timeout: Duration,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::default(),
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialTransport {
    pub fn new(baud_rate: BaudRate) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Transport for SerialTransport {
    type Error = IoError;
    type Reader = SerialPortIo;
    type Writer = SerialPortIo;

    fn open(&mut self, port: &str) -> Result<(Self::Reader, Self::Writer), Self::Error> {
        let writer = serialport::new(port, self.baud_rate.bits_per_second())
            .timeout(self.timeout)
            .open()?;
        let reader = writer.try_clone()?;
        Ok((SerialPortIo(reader), SerialPortIo(writer)))
    }

    fn enumerate(&self) -> Result<Vec<PortInfo>, Self::Error> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    name: port.port_name,
                    description: usb.product.or(usb.manufacturer),
                    vendor_id: Some(usb.vid),
                    product_id: Some(usb.pid),
                    serial_number: usb.serial_number,
                },
                SerialPortType::BluetoothPort => PortInfo {
                    name: port.port_name,
                    description: Some("Bluetooth".to_string()),
                    ..Default::default()
                },
                SerialPortType::PciPort | SerialPortType::Unknown => PortInfo {
                    name: port.port_name,
                    ..Default::default()
                },
            })
            .collect())
    }
}
