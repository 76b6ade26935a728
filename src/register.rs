//! This module defines the wire constants of the DPS PSUs: frame headers, command
//! classes, and the type codes which address each device field.

use strum::IntoEnumIterator;
use strum_macros::{EnumCount, EnumIter, IntoStaticStr};
use tracing::warn;

/// Header byte of frames sent to the device.
pub const REQUEST_HEADER: u8 = 0xF1;
/// Header byte of frames sent by the device.
pub const RESPONSE_HEADER: u8 = 0xF0;

/// Which way a frame travels, which decides its header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Request,
    /// Device to host.
    Response,
}

impl Direction {
    pub const fn header(self) -> u8 {
        match self {
            Direction::Request => REQUEST_HEADER,
            Direction::Response => RESPONSE_HEADER,
        }
    }
}

/// Operation class of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Command {
    /// Read a field (or the aggregate).
    Get = 0xA1,
    /// Write a field.
    Set = 0xB1,
    /// Select the serial baud rate.
    BaudRate = 0xB0,
    /// Open (`1`) or close (`0`) the remote-control session.
    Session = 0xC1,
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        value as u8
    }
}

/// Payload of a [`Command::Session`] frame which opens the session.
pub const SESSION_OPEN: u8 = 1;
/// Payload of a [`Command::Session`] frame which releases the session.
pub const SESSION_CLOSE: u8 = 0;

/// Type codes of the scalar device fields.
///
/// The twelve preset-group codes (`0xC5..=0xD0`) are addressed through
/// [`PresetGroup`](crate::preset::PresetGroup) instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Register {
    /// __R__ - Input voltage, f32 volts.
    InputVoltage = 0xC0,
    /// __R/W__ - Active voltage setting, f32 volts.
    SetVoltage = 0xC1,
    /// __R/W__ - Active current setting, f32 amps.
    SetCurrent = 0xC2,
    /// __R__ - Output voltage, current and power as three consecutive f32.
    OutputVoltageCurrentPower = 0xC3,
    /// __R__ - Internal temperature, f32 degrees Celsius.
    Temperature = 0xC4,
    /// __R/W__ - Over-voltage protection level.
    OverVoltageProtection = 0xD1,
    /// __R/W__ - Over-current protection level.
    OverCurrentProtection = 0xD2,
    /// __R/W__ - Over-power protection level.
    OverPowerProtection = 0xD3,
    /// __R/W__ - Over-temperature protection level.
    OverTemperatureProtection = 0xD4,
    /// __R/W__ - Low (input) voltage protection level.
    UnderVoltageProtection = 0xD5,
    /// __R/W__ - Display brightness, u8 in 0-10.
    Brightness = 0xD6,
    /// __R/W__ - Buzzer volume, u8 in 0-10.
    AudibleLevel = 0xD7,
    /// __R/W__ - Capacity/energy metering switch, u8.
    MeteringEnabled = 0xD8,
    /// __R__ - Accumulated output charge, f32 amp-hours.
    OutputCharge = 0xD9,
    /// __R__ - Accumulated output energy, f32 watt-hours.
    OutputEnergy = 0xDA,
    /// __R/W__ - Output switch, u8.
    OutputEnabled = 0xDB,
    /// __R__ - Active protection, u8 index into [`ProtectionFault`].
    ProtectionFault = 0xDC,
    /// __R__ - Regulation mode, u8. See [`ControlMode`].
    Mode = 0xDD,
    /// __R__ - Model name, text.
    ModelName = 0xDE,
    /// __R__ - Hardware revision, text.
    HardwareVersion = 0xDF,
    /// __R__ - Firmware revision, text.
    FirmwareVersion = 0xE0,
    /// __R__ - Upper hardware voltage limit, f32 volts.
    MaxVoltage = 0xE2,
    /// __R__ - Upper hardware current limit, f32 amps.
    MaxCurrent = 0xE3,
    /// __R__ - Every field at once. See [`telemetry`](crate::telemetry).
    All = 0xFF,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Register {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Register::iter()
            .find(|register| *register as u8 == value)
            .ok_or(value)
    }
}

/// Which protection limit to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ProtectionKind {
    OverVoltage,
    OverCurrent,
    OverPower,
    OverTemperature,
    UnderVoltage,
}

impl ProtectionKind {
    /// The register holding this limit.
    pub const fn register(self) -> Register {
        match self {
            ProtectionKind::OverVoltage => Register::OverVoltageProtection,
            ProtectionKind::OverCurrent => Register::OverCurrentProtection,
            ProtectionKind::OverPower => Register::OverPowerProtection,
            ProtectionKind::OverTemperature => Register::OverTemperatureProtection,
            ProtectionKind::UnderVoltage => Register::UnderVoltageProtection,
        }
    }
}

/// Represents the two possible power supply control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// Constant current regulation mode.
    Cc,
    /// Constant voltage regulation mode.
    #[default]
    Cv,
}

impl From<u8> for ControlMode {
    fn from(value: u8) -> Self {
        match value {
            0 => ControlMode::Cc,
            _ => ControlMode::Cv,
        }
    }
}

/// Protection which has tripped, in the order the device indexes them.
///
/// Converts into its front-panel mnemonic via `&'static str`.
#[derive(Debug, EnumIter, EnumCount, IntoStaticStr, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum ProtectionFault {
    /// 0: No protection active.
    #[default]
    #[strum(serialize = "")]
    None = 0,
    /// 1: OVP over-voltage protection.
    #[strum(serialize = "OVP")]
    OverVoltage = 1,
    /// 2: OCP over-current protection.
    #[strum(serialize = "OCP")]
    OverCurrent = 2,
    /// 3: OPP over-power protection.
    #[strum(serialize = "OPP")]
    OverPower = 3,
    /// 4: OTP over-temperature protection.
    #[strum(serialize = "OTP")]
    OverTemperature = 4,
    /// 5: LVP input under-voltage protection.
    #[strum(serialize = "LVP")]
    UnderVoltage = 5,
    /// 6: REP reverse polarity protection.
    #[strum(serialize = "REP")]
    ReversePolarity = 6,
}

impl ProtectionFault {
    /// Short mnemonic as shown on the device, empty for no fault.
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}

impl From<u8> for ProtectionFault {
    fn from(value: u8) -> Self {
        match ProtectionFault::iter().find(|fault| *fault as u8 == value) {
            Some(fault) => fault,
            None => {
                // Default to no fault if outside of expected values.
                warn!(index = value, "unknown protection fault index");
                ProtectionFault::None
            }
        }
    }
}

/// All baud rates the PSU can be switched to, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter)]
pub enum BaudRate {
    _9600,
    _19200,
    _38400,
    _57600,
    /// This is the default PSU baud rate.
    #[default]
    _115200,
}

impl BaudRate {
    /// Rate in bits per second.
    pub const fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::_9600 => 9600,
            BaudRate::_19200 => 19200,
            BaudRate::_38400 => 38400,
            BaudRate::_57600 => 57600,
            BaudRate::_115200 => 115200,
        }
    }

    /// Value carried by the baud rate command: the one-based position in the supported list.
    pub fn selector(self) -> u8 {
        let position = BaudRate::iter().position(|rate| rate == self).unwrap_or(0);
        position as u8 + 1
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::iter()
            .find(|rate| rate.bits_per_second() == value)
            .ok_or(value)
    }
}
