use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use embedded_io::Error as _;
use tracing::{debug, info, warn};

use crate::{
    codec::encode_f32,
    config::{SessionConfig, to_std},
    error::{Error, Result},
    frame::{self, MAX_FRAME_LEN},
    observer::{ObserverId, ObserverRegistry, ObserverResult},
    preset::{PresetField, PresetGroup},
    reassembly::StreamBuffer,
    register::{Command, ProtectionKind, Register, SESSION_CLOSE, SESSION_OPEN},
    scheduler::PeriodicTask,
    state::{DeviceIdentity, DeviceState},
    telemetry::{self, FieldUpdate},
    transport::{PortInfo, Transport},
};

/// Highest brightness and volume level the device accepts.
pub const MAX_LEVEL: u8 = 10;

/// Identity strings requested during initialisation, in order.
const IDENTITY_REGISTERS: [Register; 3] = [
    Register::ModelName,
    Register::HardwareVersion,
    Register::FirmwareVersion,
];

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, running the initialisation sequence.
    Initializing,
    Connected,
    /// The link failed. [`DpsPsu::disconnect`] returns to [`SessionStatus::Disconnected`].
    Faulted,
}

/// Session state shared with the reader thread.
#[derive(Default)]
struct Session {
    status: SessionStatus,
    port: Option<String>,
    snapshot: DeviceState,
    buffer: StreamBuffer,
    /// Number of aggregate reports merged so far.
    aggregates: u64,
    /// Kind of the read error which faulted the link, if any.
    fault: Option<embedded_io::ErrorKind>,
}

#[derive(Default)]
struct Shared {
    session: Mutex<Session>,
    /// Signalled after every merge and on faults.
    changed: Condvar,
    observers: ObserverRegistry,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SessionStatus) {
        let mut session = self.lock();
        if session.status != status {
            debug!(from = ?session.status, to = ?status, "session status");
            session.status = status;
        }
    }

    /// Handle bytes delivered by the transport.
    fn receive(&self, bytes: &[u8]) {
        let snapshots = {
            let mut session = self.lock();
            let frames = session.buffer.push(bytes);

            let mut snapshots = Vec::with_capacity(frames.len());
            for raw in frames {
                let frame = match frame::decode(&raw) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "dropping rejected frame");
                        continue;
                    }
                };
                let updates = match telemetry::decode(frame.type_code, &frame.payload) {
                    Ok(updates) => updates,
                    Err(err) => {
                        warn!(type_code = frame.type_code, error = %err, "dropping undecodable frame");
                        continue;
                    }
                };
                if updates.is_empty() {
                    continue;
                }

                debug!(type_code = frame.type_code, fields = updates.len(), "merging frame");
                session.snapshot.merge(updates);
                if frame.type_code == u8::from(Register::All) {
                    session.aggregates += 1;
                }
                snapshots.push(session.snapshot.clone());
            }
            snapshots
        };

        if !snapshots.is_empty() {
            self.changed.notify_all();
        }
        for snapshot in &snapshots {
            self.observers.notify(snapshot);
        }
    }

    /// Merge updates which did not come from the device, e.g. after loading a preset.
    fn merge_local(&self, updates: Vec<FieldUpdate>) {
        let snapshot = {
            let mut session = self.lock();
            session.snapshot.merge(updates);
            session.snapshot.clone()
        };
        self.observers.notify(&snapshot);
    }

    /// Record a fatal read error.
    fn fault(&self, kind: embedded_io::ErrorKind) {
        {
            let mut session = self.lock();
            session.fault = Some(kind);
            session.status = SessionStatus::Faulted;
        }
        self.changed.notify_all();
    }

    /// Finish initialisation, unless the link faulted while it ran.
    fn mark_connected(&self) -> Result<()> {
        let mut session = self.lock();
        if let Some(kind) = session.fault {
            return Err(Error::ConnectionFailure {
                context: "read",
                kind,
            });
        }
        if session.status != SessionStatus::Initializing {
            return Err(Error::SessionClosing);
        }
        debug!(from = ?session.status, to = ?SessionStatus::Connected, "session status");
        session.status = SessionStatus::Connected;
        Ok(())
    }

    /// Wait until `done` holds, the link faults or `timeout` passes.
    fn wait_for(&self, timeout: Duration, done: impl Fn(&Session) -> bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut session = self.lock();
        loop {
            if done(&session) {
                return Ok(());
            }
            if let Some(kind) = session.fault {
                return Err(Error::ConnectionFailure {
                    context: "read",
                    kind,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            session = self
                .changed
                .wait_timeout(session, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Write half of the link. Frames go out one at a time, each followed by the settle delay.
struct Outbound<W> {
    writer: Mutex<Option<W>>,
    settle: Duration,
}

impl<W: embedded_io::Write> Outbound<W> {
    fn send(&self, command: Command, type_code: u8, payload: &[u8]) -> Result<()> {
        let frame = frame::encode(command, type_code, payload)?;

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let port = writer.as_mut().ok_or(Error::SessionClosing)?;
        port.write_all(&frame)
            .map_err(|err| Error::connection("write", err))?;
        port.flush().map_err(|err| Error::connection("flush", err))?;
        debug!(?command, type_code, len = payload.len(), "frame sent");

        // Hold the writer while settling so the next frame cannot overtake.
        thread::sleep(self.settle);
        Ok(())
    }

    /// Take the writer out, so further sends see [`Error::SessionClosing`].
    fn close(&self) -> Option<W> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Everything that exists only while the transport is open.
struct Link<W> {
    outbound: Arc<Outbound<W>>,
    closing: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    poller: Option<PeriodicTask>,
}

impl<W: embedded_io::Write + Send + 'static> Link<W> {
    fn start<R>(reader: R, writer: W, shared: &Arc<Shared>, settle: Duration) -> Result<Self>
    where
        R: embedded_io::Read + Send + 'static,
    {
        let closing = Arc::new(AtomicBool::new(false));
        let reader_shared = Arc::clone(shared);
        let reader_closing = Arc::clone(&closing);
        let handle = thread::Builder::new()
            .name("dps-reader".to_string())
            .spawn(move || read_loop(reader, reader_shared, reader_closing))
            .map_err(|_| Error::ConnectionFailure {
                context: "spawn reader",
                kind: embedded_io::ErrorKind::Other,
            })?;

        Ok(Self {
            outbound: Arc::new(Outbound {
                writer: Mutex::new(Some(writer)),
                settle,
            }),
            closing,
            reader: Some(handle),
            poller: None,
        })
    }

    fn start_polling(&mut self, interval: Duration) -> Result<()> {
        let outbound = Arc::clone(&self.outbound);
        let task = PeriodicTask::spawn("dps-poll", interval, move || {
            match outbound.send(Command::Get, Register::All.into(), &[]) {
                Ok(()) => {}
                Err(Error::SessionClosing) => debug!("poll skipped, session closing"),
                Err(err) => warn!(error = %err, "poll failed"),
            }
        })
        .map_err(|_| Error::ConnectionFailure {
            context: "spawn poller",
            kind: embedded_io::ErrorKind::Other,
        })?;
        self.poller = Some(task);
        Ok(())
    }

    fn stop_polling(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
    }

    /// Stop both threads and release the transport.
    fn shutdown(&mut self) {
        self.stop_polling();
        self.closing.store(true, Ordering::Release);
        drop(self.outbound.close());
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("reader thread panicked");
            }
        }
    }
}

/// Body of the reader thread: feed everything read into the session until closed.
fn read_loop<R: embedded_io::Read>(mut reader: R, shared: Arc<Shared>, closing: Arc<AtomicBool>) {
    let mut chunk = [0u8; MAX_FRAME_LEN];
    while !closing.load(Ordering::Acquire) {
        match reader.read(&mut chunk) {
            Ok(0) => {
                // End of stream, the port has gone away.
                if !closing.load(Ordering::Acquire) {
                    warn!("port closed by peer, link faulted");
                    shared.fault(embedded_io::ErrorKind::NotConnected);
                }
                break;
            }
            Ok(n) => shared.receive(&chunk[..n]),
            Err(err) => match err.kind() {
                embedded_io::ErrorKind::TimedOut | embedded_io::ErrorKind::Interrupted => {}
                kind => {
                    if !closing.load(Ordering::Acquire) {
                        warn!(?kind, "read failed, link faulted");
                        shared.fault(kind);
                    }
                    break;
                }
            },
        }
    }
    debug!("reader stopped");
}

/// A session with one DPS power supply.
///
/// The session owns the transport. [`DpsPsu::connect`] opens it and runs the initialisation
/// sequence, after which a background thread keeps the [`DeviceState`] snapshot fresh by
/// polling the full device state. Commands may be issued from any thread holding a shared
/// reference, and listeners registered with [`DpsPsu::subscribe`] see every change.
///
/// Method naming follows the device: "set" writes a configuration value and "save"/"load"
/// act on preset groups. Reading is always from the snapshot.
pub struct DpsPsu<T: Transport> {
    transport: T,
    config: SessionConfig,
    shared: Arc<Shared>,
    link: Option<Link<T::Writer>>,
}

impl<T: Transport> DpsPsu<T> {
    /// Create a disconnected session which will open ports through `transport`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            shared: Arc::new(Shared::default()),
            link: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// Identifier of the port in use, while a link exists.
    pub fn port(&self) -> Option<String> {
        self.shared.lock().port.clone()
    }

    /// A copy of the current device state.
    pub fn snapshot(&self) -> DeviceState {
        self.shared.lock().snapshot.clone()
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.shared.lock().snapshot.identity.clone()
    }

    /// List the ports the transport could open.
    pub fn enumerate_ports(&self) -> Result<Vec<PortInfo>> {
        self.transport
            .enumerate()
            .map_err(|err| Error::connection("enumerate", err))
    }

    /// Register a listener, called with the full snapshot after every change.
    pub fn subscribe<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&DeviceState) -> ObserverResult + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    /// Open `port`, initialise the device and start polling.
    ///
    /// On failure the session is left [`SessionStatus::Faulted`] with the transport released.
    /// Identity strings received before the failure are kept.
    pub fn connect(&mut self, port: &str) -> Result<()> {
        {
            let mut session = self.shared.lock();
            if session.status != SessionStatus::Disconnected {
                return Err(Error::AlreadyConnected);
            }
            session.status = SessionStatus::Connecting;
            session.port = Some(port.to_string());
            session.fault = None;
            session.buffer.clear();
        }
        info!(port, "connecting");

        let (reader, writer) = match self.transport.open(port) {
            Ok(halves) => halves,
            Err(err) => {
                let err = Error::connection("open", err);
                warn!(port, error = %err, "open failed");
                self.shared.set_status(SessionStatus::Faulted);
                return Err(err);
            }
        };

        self.shared.set_status(SessionStatus::Initializing);
        let started = self
            .start_link(reader, writer)
            .and_then(|()| self.shared.mark_connected());
        if let Err(err) = started {
            warn!(port, error = %err, "initialisation failed");
            if let Some(mut link) = self.link.take() {
                link.shutdown();
            }
            self.shared.set_status(SessionStatus::Faulted);
            return Err(err);
        }

        let identity = self.identity();
        info!(
            port,
            model = %identity.model_name,
            hardware = %identity.hardware_version,
            firmware = %identity.firmware_version,
            "connected"
        );
        Ok(())
    }

    /// Start the reader, initialise the device, then start polling.
    fn start_link(&mut self, reader: T::Reader, writer: T::Writer) -> Result<()> {
        let link = Link::start(reader, writer, &self.shared, to_std(self.config.settle_delay))?;
        self.link = Some(link);
        self.initialize()?;
        match self.link.as_mut() {
            Some(link) => link.start_polling(to_std(self.config.poll_interval)),
            None => Err(Error::SessionClosing),
        }
    }

    /// The initialisation sequence: open the session, select the baud rate, read the
    /// identity strings and wait for the first full state report.
    fn initialize(&self) -> Result<()> {
        let outbound = self.outbound()?;

        outbound.send(Command::Session, 0, &[SESSION_OPEN])?;
        outbound.send(Command::BaudRate, 0, &[self.config.baud_rate.selector()])?;

        for register in IDENTITY_REGISTERS {
            outbound.send(Command::Get, register.into(), &[])?;
        }
        let retries = self.config.identity_retries;
        let window = to_std(self.config.init_timeout) / (u32::from(retries) + 1);
        for attempt in 0..=retries {
            match self
                .shared
                .wait_for(window, |session| session.snapshot.identity.is_complete())
            {
                Ok(()) => break,
                Err(Error::Timeout) => {}
                Err(err) => return Err(err),
            }
            let missing = self.missing_identity();
            if attempt == retries {
                warn!(?missing, "identity incomplete");
                break;
            }
            debug!(attempt = attempt + 1, ?missing, "requesting identity again");
            for register in missing {
                outbound.send(Command::Get, register.into(), &[])?;
            }
        }

        let seen = self.shared.lock().aggregates;
        outbound.send(Command::Get, Register::All.into(), &[])?;
        self.shared
            .wait_for(to_std(self.config.init_timeout), |session| {
                session.aggregates > seen
            })
    }

    fn missing_identity(&self) -> Vec<Register> {
        let session = self.shared.lock();
        let identity = &session.snapshot.identity;
        IDENTITY_REGISTERS
            .into_iter()
            .filter(|register| match register {
                Register::ModelName => identity.model_name.is_empty(),
                Register::HardwareVersion => identity.hardware_version.is_empty(),
                _ => identity.firmware_version.is_empty(),
            })
            .collect()
    }

    /// Stop polling, tell the device we are leaving and release the transport.
    ///
    /// Never fails: a device which has gone away must not block cleanup. Calling this on a
    /// disconnected session does nothing.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            info!(port = ?self.port(), "disconnecting");
            link.stop_polling();
            if let Err(err) = link.outbound.send(Command::Session, 0, &[SESSION_CLOSE]) {
                debug!(error = %err, "session close not delivered");
            }
            link.shutdown();
        }

        let mut session = self.shared.lock();
        session.status = SessionStatus::Disconnected;
        session.port = None;
        session.buffer.clear();
    }

    /// The writer, if the session is in a state to send.
    fn outbound(&self) -> Result<&Outbound<T::Writer>> {
        match self.status() {
            SessionStatus::Initializing | SessionStatus::Connected => {}
            _ => return Err(Error::NotConnected),
        }
        self.link
            .as_ref()
            .map(|link| link.outbound.as_ref())
            .ok_or(Error::NotConnected)
    }

    /// Commands from callers require a fully connected session.
    fn connected(&self) -> Result<&Outbound<T::Writer>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.outbound()
    }

    fn set_float(&self, register: impl Into<u8>, value: f32) -> Result<()> {
        self.connected()?
            .send(Command::Set, register.into(), &encode_f32(value))
    }

    fn set_byte(&self, register: Register, value: u8) -> Result<()> {
        self.connected()?.send(Command::Set, register.into(), &[value])
    }

    /// Set the output target voltage, in volts.
    pub fn set_voltage(&self, volts: f32) -> Result<()> {
        let volts = check_analogue("voltage", volts)?;
        check_hardware_limit("voltage", volts, self.snapshot().max_voltage)?;
        self.set_float(Register::SetVoltage, volts)
    }

    /// Set the output current limit, in amps.
    pub fn set_current(&self, amps: f32) -> Result<()> {
        let amps = check_analogue("current", amps)?;
        check_hardware_limit("current", amps, self.snapshot().max_current)?;
        self.set_float(Register::SetCurrent, amps)
    }

    /// Set one protection level. Units follow the limit: volts, amps, watts or °C.
    pub fn set_protection_limit(&self, kind: ProtectionKind, value: f32) -> Result<()> {
        let value = check_analogue("protection limit", value)?;
        self.set_float(kind.register(), value)
    }

    /// Enable/disable the output.
    pub fn set_output_enabled(&self, enabled: bool) -> Result<()> {
        self.set_byte(Register::OutputEnabled, enabled as u8)
    }

    /// Set the display brightness, 0 - 10.
    pub fn set_brightness(&self, level: u8) -> Result<()> {
        let level = check_level("brightness", level)?;
        self.set_byte(Register::Brightness, level)
    }

    /// Set the buzzer volume, 0 - 10.
    pub fn set_audible_level(&self, level: u8) -> Result<()> {
        let level = check_level("audible level", level)?;
        self.set_byte(Register::AudibleLevel, level)
    }

    /// Enable/disable charge and energy metering.
    pub fn set_metering_enabled(&self, enabled: bool) -> Result<()> {
        self.set_byte(Register::MeteringEnabled, enabled as u8)
    }

    /// Store a voltage and current in preset group 1 - 6.
    pub fn save_group(&self, group: u8, volts: f32, amps: f32) -> Result<()> {
        let group = PresetGroup::try_from(group)?;
        let volts = check_analogue("preset voltage", volts)?;
        let amps = check_analogue("preset current", amps)?;

        self.set_float(group.type_code(PresetField::Voltage), volts)?;
        self.set_float(group.type_code(PresetField::Current), amps)
    }

    /// Make preset group 1 - 6 the active setting.
    ///
    /// The preset values come from the snapshot rather than a fresh query, and are written
    /// back into the snapshot's active settings once sent.
    pub fn load_group(&self, group: u8) -> Result<()> {
        let group = PresetGroup::try_from(group)?;
        let preset = self.snapshot().preset(group);

        self.set_float(Register::SetVoltage, preset.voltage)?;
        self.set_float(Register::SetCurrent, preset.current)?;
        debug!(group = group.number(), ?preset, "preset loaded");

        self.shared.merge_local(vec![
            FieldUpdate::SetVoltage(preset.voltage),
            FieldUpdate::SetCurrent(preset.current),
        ]);
        Ok(())
    }

    /// Ask for a full state report now, outside the polling schedule.
    pub fn request_all(&self) -> Result<()> {
        self.connected()?
            .send(Command::Get, Register::All.into(), &[])
    }
}

impl<T: Transport> Drop for DpsPsu<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Analogue settings must be real, non-negative numbers.
fn check_analogue(field: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::ValueOutOfRange { field, value })
    }
}

/// Reject values above a hardware limit, once the device has reported one.
fn check_hardware_limit(field: &'static str, value: f32, limit: f32) -> Result<()> {
    if limit > 0.0 && value > limit {
        Err(Error::ValueOutOfRange { field, value })
    } else {
        Ok(())
    }
}

fn check_level(field: &'static str, level: u8) -> Result<u8> {
    if level <= MAX_LEVEL {
        Ok(level)
    } else {
        Err(Error::ValueOutOfRange {
            field,
            value: level as f32,
        })
    }
}
