//! Turning decoded frames into typed field updates.
//!
//! Every type code maps onto an [`Address`], and every address onto zero or more
//! [`FieldUpdate`]s. The aggregate code ([`Register::All`]) carries the whole device state
//! in one 139 byte payload:
//!
//! | Offset     | Field                                  |
//! |------------|----------------------------------------|
//! | 0 - 24     | input V, set V, set I, out V, out I, out P, temperature (f32) |
//! | 28 - 72    | presets M1 - M6, voltage then current (f32) |
//! | 76 - 92    | OVP, OCP, OPP, OTP, LVP (f32)          |
//! | 96, 97, 98 | brightness, volume, metering (u8)      |
//! | 99, 103    | output Ah, output Wh (f32)             |
//! | 107 - 110  | output on, protection, mode, reserved (u8) |
//! | 111, 115   | max voltage, max current (f32)         |
//! | 119 - 138  | reserved                               |

use strum::IntoEnumIterator;
use tracing::debug;

use crate::{
    codec::{decode_f32, decode_text, decode_u8},
    error::Result,
    preset::{PresetField, PresetGroup},
    register::{ControlMode, ProtectionFault, ProtectionKind, Register},
};

/// Full length of the aggregate payload.
pub const AGGREGATE_LEN: usize = 139;

/// Byte offsets within the aggregate payload.
mod layout {
    pub const INPUT_VOLTAGE: usize = 0;
    pub const SET_VOLTAGE: usize = 4;
    pub const SET_CURRENT: usize = 8;
    pub const OUTPUT_VOLTAGE: usize = 12;
    pub const OUTPUT_CURRENT: usize = 16;
    pub const OUTPUT_POWER: usize = 20;
    pub const TEMPERATURE: usize = 24;
    /// Group 1 voltage. Each group takes 8 bytes, voltage first.
    pub const PRESETS: usize = 28;
    /// Over-voltage limit. The other four limits follow at 4 byte steps.
    pub const PROTECTIONS: usize = 76;
    pub const BRIGHTNESS: usize = 96;
    pub const AUDIBLE_LEVEL: usize = 97;
    pub const METERING_ENABLED: usize = 98;
    pub const OUTPUT_CHARGE: usize = 99;
    pub const OUTPUT_ENERGY: usize = 103;
    pub const OUTPUT_ENABLED: usize = 107;
    pub const PROTECTION_FAULT: usize = 108;
    pub const MODE: usize = 109;
    pub const MAX_VOLTAGE: usize = 111;
    pub const MAX_CURRENT: usize = 115;
}

/// What a type code addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Scalar(Register),
    Preset(PresetGroup, PresetField),
    Unknown(u8),
}

impl From<u8> for Address {
    fn from(code: u8) -> Self {
        if let Ok(register) = Register::try_from(code) {
            Address::Scalar(register)
        } else if let Some((group, field)) = PresetGroup::from_type_code(code) {
            Address::Preset(group, field)
        } else {
            Address::Unknown(code)
        }
    }
}

/// One device field with its newly decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    InputVoltage(f32),
    SetVoltage(f32),
    SetCurrent(f32),
    OutputVoltage(f32),
    OutputCurrent(f32),
    OutputPower(f32),
    Temperature(f32),
    PresetVoltage(PresetGroup, f32),
    PresetCurrent(PresetGroup, f32),
    ProtectionLimit(ProtectionKind, f32),
    Brightness(u8),
    AudibleLevel(u8),
    MeteringEnabled(bool),
    OutputCharge(f32),
    OutputEnergy(f32),
    OutputEnabled(bool),
    ProtectionFault(ProtectionFault),
    Mode(ControlMode),
    MaxVoltage(f32),
    MaxCurrent(f32),
    ModelName(String),
    HardwareVersion(String),
    FirmwareVersion(String),
}

/// Decode the payload of a frame addressed to `type_code`.
///
/// Unknown type codes yield no updates. A scalar payload too short for its field is a
/// [`MalformedPayload`](crate::error::Error::MalformedPayload) error.
pub fn decode(type_code: u8, payload: &[u8]) -> Result<Vec<FieldUpdate>> {
    use FieldUpdate as FU;

    let register = match Address::from(type_code) {
        Address::Scalar(register) => register,
        Address::Preset(group, PresetField::Voltage) => {
            return Ok(vec![FU::PresetVoltage(group, decode_f32(payload)?)]);
        }
        Address::Preset(group, PresetField::Current) => {
            return Ok(vec![FU::PresetCurrent(group, decode_f32(payload)?)]);
        }
        Address::Unknown(code) => {
            debug!(type_code = code, len = payload.len(), "ignoring unknown type code");
            return Ok(Vec::new());
        }
    };

    let float = || decode_f32(payload);
    let byte = || decode_u8(payload);

    let update = match register {
        Register::InputVoltage => FU::InputVoltage(float()?),
        Register::SetVoltage => FU::SetVoltage(float()?),
        Register::SetCurrent => FU::SetCurrent(float()?),
        Register::OutputVoltageCurrentPower => {
            let voltage = decode_f32(payload)?;
            let current = decode_f32(payload.get(4..).unwrap_or_default())?;
            let power = decode_f32(payload.get(8..).unwrap_or_default())?;
            return Ok(vec![
                FU::OutputVoltage(voltage),
                FU::OutputCurrent(current),
                FU::OutputPower(power),
            ]);
        }
        Register::Temperature => FU::Temperature(float()?),
        Register::OverVoltageProtection => FU::ProtectionLimit(ProtectionKind::OverVoltage, float()?),
        Register::OverCurrentProtection => FU::ProtectionLimit(ProtectionKind::OverCurrent, float()?),
        Register::OverPowerProtection => FU::ProtectionLimit(ProtectionKind::OverPower, float()?),
        Register::OverTemperatureProtection => {
            FU::ProtectionLimit(ProtectionKind::OverTemperature, float()?)
        }
        Register::UnderVoltageProtection => {
            FU::ProtectionLimit(ProtectionKind::UnderVoltage, float()?)
        }
        Register::Brightness => FU::Brightness(byte()?),
        Register::AudibleLevel => FU::AudibleLevel(byte()?),
        Register::MeteringEnabled => FU::MeteringEnabled(byte()? != 0),
        Register::OutputCharge => FU::OutputCharge(float()?),
        Register::OutputEnergy => FU::OutputEnergy(float()?),
        Register::OutputEnabled => FU::OutputEnabled(byte()? != 0),
        Register::ProtectionFault => FU::ProtectionFault(ProtectionFault::from(byte()?)),
        Register::Mode => FU::Mode(ControlMode::from(byte()?)),
        Register::ModelName => FU::ModelName(decode_text(payload)),
        Register::HardwareVersion => FU::HardwareVersion(decode_text(payload)),
        Register::FirmwareVersion => FU::FirmwareVersion(decode_text(payload)),
        Register::MaxVoltage => FU::MaxVoltage(float()?),
        Register::MaxCurrent => FU::MaxCurrent(float()?),
        Register::All => return Ok(decode_aggregate(payload)),
    };
    Ok(vec![update])
}

/// Collects aggregate fields, skipping any whose bytes are not all present.
struct AggregateReader<'a> {
    payload: &'a [u8],
    updates: Vec<FieldUpdate>,
}

impl AggregateReader<'_> {
    fn float(&mut self, offset: usize, update: impl FnOnce(f32) -> FieldUpdate) {
        if let Some(bytes) = self.payload.get(offset..offset + 4) {
            if let Ok(value) = decode_f32(bytes) {
                self.updates.push(update(value));
            }
        }
    }

    fn byte(&mut self, offset: usize, update: impl FnOnce(u8) -> FieldUpdate) {
        if let Some(value) = self.payload.get(offset) {
            self.updates.push(update(*value));
        }
    }
}

/// Decode the aggregate payload.
///
/// Short payloads are accepted, only the fields they fully cover are returned.
pub fn decode_aggregate(payload: &[u8]) -> Vec<FieldUpdate> {
    use FieldUpdate as FU;

    if payload.len() < AGGREGATE_LEN {
        debug!(len = payload.len(), "short aggregate payload");
    }

    let mut reader = AggregateReader {
        payload,
        updates: Vec::with_capacity(40),
    };

    reader.float(layout::INPUT_VOLTAGE, FU::InputVoltage);
    reader.float(layout::SET_VOLTAGE, FU::SetVoltage);
    reader.float(layout::SET_CURRENT, FU::SetCurrent);
    reader.float(layout::OUTPUT_VOLTAGE, FU::OutputVoltage);
    reader.float(layout::OUTPUT_CURRENT, FU::OutputCurrent);
    reader.float(layout::OUTPUT_POWER, FU::OutputPower);
    reader.float(layout::TEMPERATURE, FU::Temperature);

    for group in PresetGroup::iter() {
        let base = layout::PRESETS + group.index() * 8;
        reader.float(base, |v| FU::PresetVoltage(group, v));
        reader.float(base + 4, |v| FU::PresetCurrent(group, v));
    }

    for (i, kind) in ProtectionKind::iter().enumerate() {
        reader.float(layout::PROTECTIONS + i * 4, |v| FU::ProtectionLimit(kind, v));
    }

    reader.byte(layout::BRIGHTNESS, FU::Brightness);
    reader.byte(layout::AUDIBLE_LEVEL, FU::AudibleLevel);
    reader.byte(layout::METERING_ENABLED, |b| FU::MeteringEnabled(b != 0));
    reader.float(layout::OUTPUT_CHARGE, FU::OutputCharge);
    reader.float(layout::OUTPUT_ENERGY, FU::OutputEnergy);
    reader.byte(layout::OUTPUT_ENABLED, |b| FU::OutputEnabled(b != 0));
    reader.byte(layout::PROTECTION_FAULT, |b| {
        FU::ProtectionFault(ProtectionFault::from(b))
    });
    reader.byte(layout::MODE, |b| FU::Mode(ControlMode::from(b)));
    reader.float(layout::MAX_VOLTAGE, FU::MaxVoltage);
    reader.float(layout::MAX_CURRENT, FU::MaxCurrent);

    reader.updates
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{codec::encode_f32, error::Error, state::DeviceState};

    fn put_f32(buffer: &mut [u8], offset: usize, value: f32) {
        buffer[offset..offset + 4].copy_from_slice(&encode_f32(value));
    }

    /// A 139 byte aggregate payload with a distinct value in every field.
    pub(crate) fn aggregate_fixture() -> Vec<u8> {
        let mut payload = vec![0u8; AGGREGATE_LEN];
        put_f32(&mut payload, 0, 12.34); // input voltage
        put_f32(&mut payload, 4, 5.5); // set voltage
        put_f32(&mut payload, 8, 1.25); // set current
        put_f32(&mut payload, 12, 5.0); // output voltage
        put_f32(&mut payload, 16, 1.0); // output current
        put_f32(&mut payload, 20, 5.0 * 1.0 + 0.01); // output power
        put_f32(&mut payload, 24, 31.5); // temperature
        for group in 0..6 {
            put_f32(&mut payload, 28 + group * 8, 1.0 + group as f32);
            put_f32(&mut payload, 32 + group * 8, 0.1 * (group as f32 + 1.0));
        }
        put_f32(&mut payload, 76, 30.5); // OVP
        put_f32(&mut payload, 80, 5.1); // OCP
        put_f32(&mut payload, 84, 150.0); // OPP
        put_f32(&mut payload, 88, 80.0); // OTP
        put_f32(&mut payload, 92, 4.5); // LVP
        payload[96] = 7; // brightness
        payload[97] = 3; // volume
        payload[98] = 1; // metering on
        put_f32(&mut payload, 99, 0.125); // Ah
        put_f32(&mut payload, 103, 2.75); // Wh
        payload[107] = 1; // output on
        payload[108] = 0; // no protection
        payload[109] = 1; // CV
        payload[110] = 0xEE; // reserved
        put_f32(&mut payload, 111, 30.0); // max voltage
        put_f32(&mut payload, 115, 5.2); // max current
        payload
    }

    #[test]
    fn address_dispatch() {
        assert_eq!(Address::from(0xC0), Address::Scalar(Register::InputVoltage));
        assert_eq!(
            Address::from(0xCA),
            Address::Preset(PresetGroup::Group3, PresetField::Current)
        );
        assert_eq!(Address::from(0xFF), Address::Scalar(Register::All));
        assert_eq!(Address::from(0xE1), Address::Unknown(0xE1));
    }

    #[test]
    fn decode_single_floats() {
        let payload = encode_f32(12.34);
        assert_eq!(
            decode(0xC0, &payload).unwrap(),
            [FieldUpdate::InputVoltage(12.34)]
        );
        assert_eq!(
            decode(0xC4, &payload).unwrap(),
            [FieldUpdate::Temperature(12.34)]
        );
        assert_eq!(
            decode(0xE2, &payload).unwrap(),
            [FieldUpdate::MaxVoltage(12.34)]
        );
        assert_eq!(
            decode(0xD9, &payload).unwrap(),
            [FieldUpdate::OutputCharge(12.34)]
        );
        assert_eq!(
            decode(0xD3, &payload).unwrap(),
            [FieldUpdate::ProtectionLimit(ProtectionKind::OverPower, 12.34)]
        );
    }

    #[test]
    fn decode_output_triple() {
        let mut payload = Vec::new();
        payload.extend(encode_f32(5.0));
        payload.extend(encode_f32(0.5));
        payload.extend(encode_f32(2.5));
        assert_eq!(
            decode(0xC3, &payload).unwrap(),
            [
                FieldUpdate::OutputVoltage(5.0),
                FieldUpdate::OutputCurrent(0.5),
                FieldUpdate::OutputPower(2.5),
            ]
        );
        assert!(matches!(
            decode(0xC3, &payload[..10]),
            Err(Error::MalformedPayload { .. })
        ));
    }

    #[test]
    fn decode_presets() {
        assert_eq!(
            decode(0xC5, &encode_f32(3.3)).unwrap(),
            [FieldUpdate::PresetVoltage(PresetGroup::Group1, 3.3)]
        );
        assert_eq!(
            decode(0xD0, &encode_f32(0.75)).unwrap(),
            [FieldUpdate::PresetCurrent(PresetGroup::Group6, 0.75)]
        );
    }

    #[test]
    fn decode_bytes() {
        assert_eq!(decode(0xD6, &[9]).unwrap(), [FieldUpdate::Brightness(9)]);
        assert_eq!(decode(0xD7, &[2]).unwrap(), [FieldUpdate::AudibleLevel(2)]);
        assert_eq!(
            decode(0xD8, &[0]).unwrap(),
            [FieldUpdate::MeteringEnabled(false)]
        );
        assert_eq!(
            decode(0xDB, &[1]).unwrap(),
            [FieldUpdate::OutputEnabled(true)]
        );
        assert_eq!(
            decode(0xDD, &[0]).unwrap(),
            [FieldUpdate::Mode(ControlMode::Cc)]
        );
        assert_eq!(
            decode(0xDD, &[2]).unwrap(),
            [FieldUpdate::Mode(ControlMode::Cv)]
        );
        assert_eq!(
            decode(0xDC, &[2]).unwrap(),
            [FieldUpdate::ProtectionFault(ProtectionFault::OverCurrent)]
        );
    }

    #[test]
    fn decode_out_of_range_fault_is_none() {
        assert_eq!(
            decode(0xDC, &[42]).unwrap(),
            [FieldUpdate::ProtectionFault(ProtectionFault::None)]
        );
    }

    #[test]
    fn decode_identity_text() {
        assert_eq!(
            decode(0xDE, b" DPS-150\0\0").unwrap(),
            [FieldUpdate::ModelName("DPS-150".into())]
        );
        assert_eq!(
            decode(0xE0, b"V1.2\0").unwrap(),
            [FieldUpdate::FirmwareVersion("V1.2".into())]
        );
    }

    #[test]
    fn decode_short_scalar_is_malformed() {
        assert!(matches!(
            decode(0xC1, &[0x00, 0x00]),
            Err(Error::MalformedPayload {
                needed: 4,
                available: 2
            })
        ));
        assert!(matches!(
            decode(0xD6, &[]),
            Err(Error::MalformedPayload { .. })
        ));
    }

    #[test]
    fn decode_unknown_code() {
        assert!(decode(0x10, &[1, 2, 3]).unwrap().is_empty());
    }

    #[test]
    fn decode_full_aggregate() {
        let payload = aggregate_fixture();
        assert_eq!(payload.len(), 139);

        let mut state = DeviceState::default();
        state.merge(decode(0xFF, &payload).unwrap());

        assert_eq!(state.input_voltage, 12.34);
        assert_eq!(state.set_voltage, 5.5);
        assert_eq!(state.set_current, 1.25);
        assert_eq!(state.output_voltage, 5.0);
        assert_eq!(state.output_current, 1.0);
        assert_eq!(state.output_power, 5.0 * 1.0 + 0.01);
        assert_eq!(state.temperature, 31.5);
        for group in PresetGroup::iter() {
            let preset = state.preset(group);
            let i = group.index() as f32;
            assert_eq!(preset.voltage, 1.0 + i);
            assert_eq!(preset.current, 0.1 * (i + 1.0));
        }
        assert_eq!(state.protection.over_voltage, 30.5);
        assert_eq!(state.protection.over_current, 5.1);
        assert_eq!(state.protection.over_power, 150.0);
        assert_eq!(state.protection.over_temperature, 80.0);
        assert_eq!(state.protection.under_voltage, 4.5);
        assert_eq!(state.brightness, 7);
        assert_eq!(state.audible_level, 3);
        assert!(state.metering_enabled);
        assert_eq!(state.output_charge, 0.125);
        assert_eq!(state.output_energy, 2.75);
        assert!(state.output_enabled);
        assert_eq!(state.protection_fault, ProtectionFault::None);
        assert_eq!(state.mode, ControlMode::Cv);
        assert_eq!(state.max_voltage, 30.0);
        assert_eq!(state.max_current, 5.2);
    }

    #[test]
    fn decode_truncated_aggregate() {
        let payload = aggregate_fixture();
        // Cut in the middle of the output charge float: everything up to the metering byte
        // is present, nothing after.
        let updates = decode(0xFF, &payload[..101]).unwrap();

        assert!(updates.contains(&FieldUpdate::InputVoltage(12.34)));
        assert!(updates.contains(&FieldUpdate::ProtectionLimit(ProtectionKind::UnderVoltage, 4.5)));
        assert!(updates.contains(&FieldUpdate::MeteringEnabled(true)));
        assert!(
            !updates
                .iter()
                .any(|u| matches!(u, FieldUpdate::OutputCharge(_) | FieldUpdate::MaxCurrent(_)))
        );
        // 7 measurements + 12 presets + 5 limits + 3 settings bytes.
        assert_eq!(updates.len(), 27);

        let mut state = DeviceState::default();
        state.max_current = 9.9;
        state.merge(updates);
        assert_eq!(state.max_current, 9.9);
        assert_eq!(state.input_voltage, 12.34);
    }

    #[test]
    fn decode_empty_aggregate() {
        assert!(decode(0xFF, &[]).unwrap().is_empty());
    }
}
