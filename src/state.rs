//! The snapshot of everything we know about the device.

use crate::{
    preset::{Preset, PresetGroup},
    register::{ControlMode, ProtectionFault, ProtectionKind},
    telemetry::FieldUpdate,
};

/// Model and revision strings reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub model_name: String,
    pub hardware_version: String,
    pub firmware_version: String,
}

impl DeviceIdentity {
    /// True once all three strings have been received.
    pub fn is_complete(&self) -> bool {
        !self.model_name.is_empty()
            && !self.hardware_version.is_empty()
            && !self.firmware_version.is_empty()
    }
}

/// Configured protection levels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProtectionLimits {
    /// Volts.
    pub over_voltage: f32,
    /// Amps.
    pub over_current: f32,
    /// Watts.
    pub over_power: f32,
    /// Degrees Celsius.
    pub over_temperature: f32,
    /// Input volts.
    pub under_voltage: f32,
}

impl ProtectionLimits {
    pub fn get(&self, kind: ProtectionKind) -> f32 {
        match kind {
            ProtectionKind::OverVoltage => self.over_voltage,
            ProtectionKind::OverCurrent => self.over_current,
            ProtectionKind::OverPower => self.over_power,
            ProtectionKind::OverTemperature => self.over_temperature,
            ProtectionKind::UnderVoltage => self.under_voltage,
        }
    }

    fn slot(&mut self, kind: ProtectionKind) -> &mut f32 {
        match kind {
            ProtectionKind::OverVoltage => &mut self.over_voltage,
            ProtectionKind::OverCurrent => &mut self.over_current,
            ProtectionKind::OverPower => &mut self.over_power,
            ProtectionKind::OverTemperature => &mut self.over_temperature,
            ProtectionKind::UnderVoltage => &mut self.under_voltage,
        }
    }
}

/// Every measured and configured device quantity.
///
/// Values start at zero and are only changed by [`DeviceState::apply`]. A field which a
/// frame does not mention keeps its previous value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    /// Volts.
    pub input_voltage: f32,
    /// Active voltage setting, volts.
    pub set_voltage: f32,
    /// Active current setting, amps.
    pub set_current: f32,
    pub output_voltage: f32,
    pub output_current: f32,
    /// Watts.
    pub output_power: f32,
    /// Degrees Celsius.
    pub temperature: f32,
    /// Groups M1 - M6, see [`DeviceState::preset`].
    pub presets: [Preset; 6],
    pub protection: ProtectionLimits,
    /// Display brightness, 0 - 10.
    pub brightness: u8,
    /// Buzzer volume, 0 - 10.
    pub audible_level: u8,
    pub metering_enabled: bool,
    /// Amp-hours delivered while metering.
    pub output_charge: f32,
    /// Watt-hours delivered while metering.
    pub output_energy: f32,
    pub output_enabled: bool,
    pub protection_fault: ProtectionFault,
    pub mode: ControlMode,
    /// Upper hardware voltage limit, zero until reported.
    pub max_voltage: f32,
    /// Upper hardware current limit, zero until reported.
    pub max_current: f32,
    pub identity: DeviceIdentity,
}

impl DeviceState {
    /// The stored voltage and current of a preset group.
    pub fn preset(&self, group: PresetGroup) -> Preset {
        self.presets[group.index()]
    }

    /// Write one decoded field into the snapshot.
    pub fn apply(&mut self, update: FieldUpdate) {
        use FieldUpdate as FU;
        match update {
            FU::InputVoltage(v) => self.input_voltage = v,
            FU::SetVoltage(v) => self.set_voltage = v,
            FU::SetCurrent(v) => self.set_current = v,
            FU::OutputVoltage(v) => self.output_voltage = v,
            FU::OutputCurrent(v) => self.output_current = v,
            FU::OutputPower(v) => self.output_power = v,
            FU::Temperature(v) => self.temperature = v,
            FU::PresetVoltage(group, v) => self.presets[group.index()].voltage = v,
            FU::PresetCurrent(group, v) => self.presets[group.index()].current = v,
            FU::ProtectionLimit(kind, v) => *self.protection.slot(kind) = v,
            FU::Brightness(v) => self.brightness = v,
            FU::AudibleLevel(v) => self.audible_level = v,
            FU::MeteringEnabled(v) => self.metering_enabled = v,
            FU::OutputCharge(v) => self.output_charge = v,
            FU::OutputEnergy(v) => self.output_energy = v,
            FU::OutputEnabled(v) => self.output_enabled = v,
            FU::ProtectionFault(v) => self.protection_fault = v,
            FU::Mode(v) => self.mode = v,
            FU::MaxVoltage(v) => self.max_voltage = v,
            FU::MaxCurrent(v) => self.max_current = v,
            FU::ModelName(v) => self.identity.model_name = v,
            FU::HardwareVersion(v) => self.identity.hardware_version = v,
            FU::FirmwareVersion(v) => self.identity.firmware_version = v,
        }
    }

    /// Apply a batch of updates in order.
    pub fn merge(&mut self, updates: impl IntoIterator<Item = FieldUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }
}
