//! We use this mocking module in unit tests to emulate a PSU on the end of a serial port.
//!
//! The simulated device parses every request frame written to it and, for the requests a
//! real unit answers, queues the matching response for the reader half.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use crate::{
    codec::checksum,
    error::FrameError,
    frame::{Frame, parse},
    register::{Command, Direction, RESPONSE_HEADER, Register},
    telemetry::tests::aggregate_fixture,
    transport::{PortInfo, Transport},
};

/// Build a device to host frame by hand.
pub fn response(type_code: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![RESPONSE_HEADER, Command::Get as u8, type_code, payload.len() as u8];
    bytes.extend_from_slice(payload);
    bytes.push(checksum(type_code, payload));
    bytes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSerialError {
    /// No data available yet.
    Timeout,
    /// Simulated broken link.
    SimulatedError,
    /// Simulated missing port.
    NotFound,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::BrokenPipe,
            MockSerialError::NotFound => embedded_io::ErrorKind::NotFound,
        }
    }
}

/// State of the simulated device, shared by both port halves and the test.
struct DeviceSim {
    /// Every byte written to the port.
    written: Vec<u8>,
    /// Written bytes not yet parsed into a request.
    unparsed: Vec<u8>,
    /// Every request frame received, in order.
    requests: Vec<Frame>,
    /// Bytes waiting to be read by the host.
    inbound: VecDeque<u8>,
    model_name: String,
    hardware_version: String,
    firmware_version: String,
    /// Answer to aggregate requests. `None` leaves them unanswered.
    aggregate: Option<Vec<u8>>,
    /// Type codes whose next request is ignored.
    ignore_once: Vec<u8>,
    /// Largest number of bytes returned by one read.
    read_chunk: usize,
    should_error_on_open: bool,
    should_error_on_write: bool,
    should_error_on_read: bool,
    /// Reads return `Ok(0)`, as an unplugged port does.
    end_of_stream: bool,
}

impl DeviceSim {
    fn handle_request(&mut self, request: &Frame) {
        if request.command != Command::Get as u8 {
            return;
        }
        if let Some(pos) = self.ignore_once.iter().position(|c| *c == request.type_code) {
            self.ignore_once.remove(pos);
            return;
        }

        let payload = match Register::try_from(request.type_code) {
            Ok(Register::ModelName) => Some(padded(&self.model_name)),
            Ok(Register::HardwareVersion) => Some(padded(&self.hardware_version)),
            Ok(Register::FirmwareVersion) => Some(padded(&self.firmware_version)),
            Ok(Register::All) => self.aggregate.clone(),
            _ => None,
        };
        if let Some(payload) = payload {
            self.inbound.extend(response(request.type_code, &payload));
        }
    }
}

/// Identity strings come back zero padded.
fn padded(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.extend_from_slice(&[0, 0, 0]);
    bytes
}

/// Test handle to the simulated device.
#[derive(Clone)]
pub struct MockSerial {
    sim: Arc<Mutex<DeviceSim>>,
}

impl MockSerial {
    /// A device which answers identity and aggregate requests.
    pub fn new() -> Self {
        Self {
            sim: Arc::new(Mutex::new(DeviceSim {
                written: Vec::new(),
                unparsed: Vec::new(),
                requests: Vec::new(),
                inbound: VecDeque::new(),
                model_name: "DPS-150".into(),
                hardware_version: "V1.0".into(),
                firmware_version: "V1.2".into(),
                aggregate: Some(aggregate_fixture()),
                ignore_once: Vec::new(),
                read_chunk: 7,
                should_error_on_open: false,
                should_error_on_write: false,
                should_error_on_read: false,
                end_of_stream: false,
            })),
        }
    }

    fn sim(&self) -> std::sync::MutexGuard<'_, DeviceSim> {
        self.sim.lock().unwrap()
    }

    /// A transport which opens this device.
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            device: self.clone(),
        }
    }

    /// Every request frame written so far.
    pub fn requests(&self) -> Vec<Frame> {
        self.sim().requests.clone()
    }

    /// Get the raw bytes written so far.
    pub fn written_data(&self) -> Vec<u8> {
        self.sim().written.clone()
    }

    /// Forget what has been written.
    pub fn clear_written_data(&self) {
        let mut sim = self.sim();
        sim.written.clear();
        sim.requests.clear();
    }

    /// Queue raw bytes for the host to read.
    pub fn push_read_data(&self, data: &[u8]) {
        self.sim().inbound.extend(data.iter().copied());
    }

    /// Queue a well formed response frame for the host to read.
    pub fn push_response(&self, type_code: u8, payload: &[u8]) {
        self.push_read_data(&response(type_code, payload));
    }

    /// True once the host has read everything queued.
    pub fn read_drained(&self) -> bool {
        self.sim().inbound.is_empty()
    }

    pub fn set_aggregate(&self, payload: Option<Vec<u8>>) {
        self.sim().aggregate = payload;
    }

    /// Ignore the next request for `type_code`.
    pub fn ignore_once(&self, type_code: u8) {
        self.sim().ignore_once.push(type_code);
    }

    pub fn set_open_error(&self, should_error: bool) {
        self.sim().should_error_on_open = should_error;
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&self, should_error: bool) {
        self.sim().should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&self, should_error: bool) {
        self.sim().should_error_on_read = should_error;
    }

    /// Make reads report end of stream.
    pub fn set_end_of_stream(&self, closed: bool) {
        self.sim().end_of_stream = closed;
    }
}

/// [`Transport`] which connects to a [`MockSerial`].
pub struct MockTransport {
    device: MockSerial,
}

impl Transport for MockTransport {
    type Error = MockSerialError;
    type Reader = MockReader;
    type Writer = MockWriter;

    fn open(&mut self, _port: &str) -> Result<(MockReader, MockWriter), MockSerialError> {
        if self.device.sim().should_error_on_open {
            return Err(MockSerialError::NotFound);
        }
        Ok((
            MockReader {
                device: self.device.clone(),
            },
            MockWriter {
                device: self.device.clone(),
            },
        ))
    }

    fn enumerate(&self) -> Result<Vec<PortInfo>, MockSerialError> {
        Ok(vec![PortInfo {
            name: "/dev/ttyMOCK0".into(),
            description: Some("DPS-150 simulator".into()),
            vendor_id: Some(0x2E3C),
            product_id: Some(0x5740),
            serial_number: None,
        }])
    }
}

pub struct MockReader {
    device: MockSerial,
}

impl embedded_io::ErrorType for MockReader {
    type Error = MockSerialError;
}

impl embedded_io::Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        {
            let mut sim = self.device.sim();
            if sim.should_error_on_read {
                return Err(MockSerialError::SimulatedError);
            }
            if sim.end_of_stream {
                return Ok(0);
            }
            if !sim.inbound.is_empty() {
                let count = buf.len().min(sim.read_chunk).min(sim.inbound.len());
                for slot in buf.iter_mut().take(count) {
                    // count never exceeds what is queued.
                    *slot = sim.inbound.pop_front().unwrap_or_default();
                }
                return Ok(count);
            }
        }
        // Behave like a serial port with a short read timeout.
        thread::sleep(Duration::from_millis(1));
        Err(MockSerialError::Timeout)
    }
}

pub struct MockWriter {
    device: MockSerial,
}

impl embedded_io::ErrorType for MockWriter {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut sim = self.device.sim();
        if sim.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        sim.written.extend_from_slice(buf);
        sim.unparsed.extend_from_slice(buf);

        loop {
            match parse(&sim.unparsed, Direction::Request) {
                Ok(request) => {
                    let len = request.payload.len() + 5;
                    sim.unparsed.drain(..len);
                    sim.handle_request(&request);
                    sim.requests.push(request);
                }
                Err(FrameError::Truncated { .. }) => break,
                Err(_) => {
                    sim.unparsed.remove(0);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.device.sim().should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode, encode};
    use embedded_io::{Read, Write};

    #[test]
    fn answers_identity_requests() {
        let device = MockSerial::new();
        let (mut reader, mut writer) = device.transport().open("mock").unwrap();

        let request = encode(Command::Get, Register::ModelName.into(), &[]).unwrap();
        writer.write_all(&request).unwrap();

        let mut bytes = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = reader.read(&mut buf) {
            bytes.extend_from_slice(&buf[..n]);
        }
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.type_code, 0xDE);
        assert_eq!(&frame.payload[..7], b"DPS-150");
        assert_eq!(device.requests().len(), 1);
    }

    #[test]
    fn reads_in_chunks() {
        let device = MockSerial::new();
        device.push_read_data(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let (mut reader, _) = device.transport().open("mock").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(reader.read(&mut buf).unwrap(), 7);
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf), Err(MockSerialError::Timeout));
    }

    #[test]
    fn ignores_once() {
        let device = MockSerial::new();
        device.ignore_once(Register::All.into());
        let (_, mut writer) = device.transport().open("mock").unwrap();

        let request = encode(Command::Get, Register::All.into(), &[]).unwrap();
        writer.write_all(&request).unwrap();
        assert!(device.read_drained());
        writer.write_all(&request).unwrap();
        assert!(!device.read_drained());
    }

    #[test]
    fn error_flags() {
        let device = MockSerial::new();
        let mut transport = device.transport();

        device.set_open_error(true);
        assert!(transport.open("mock").is_err());
        device.set_open_error(false);

        let (mut reader, mut writer) = transport.open("mock").unwrap();
        device.set_write_error(true);
        assert_eq!(writer.write(b"x"), Err(MockSerialError::SimulatedError));
        assert!(device.written_data().is_empty());

        device.set_read_error(true);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf), Err(MockSerialError::SimulatedError));
    }
}
