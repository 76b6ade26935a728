//! Preset groups M1 - M6 and their type codes.

use strum_macros::{EnumCount, EnumIter};

use crate::error::Error;

/// The type code of the group 1 voltage preset.
///
/// Type code of a preset = PRESET_OFFSET + ({group number} - 1) * 2 + {0 for voltage, 1 for current}.
///
/// There are 6 groups: M1 - M6.
pub const PRESET_OFFSET: u8 = 0xC5;

/// The two values each preset group stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PresetField {
    /// Voltage setting, f32 volts.
    Voltage = 0x00,
    /// Current setting, f32 amps.
    Current = 0x01,
}

/// This enum represents all possible preset groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(u8)]
pub enum PresetGroup {
    Group1 = 1,
    Group2 = 2,
    Group3 = 3,
    Group4 = 4,
    Group5 = 5,
    Group6 = 6,
}

impl PresetGroup {
    /// The group number as shown on the device (1 - 6).
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Zero based position, handy for indexing arrays of groups.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Return the type code of `field` within this group.
    pub const fn type_code(self, field: PresetField) -> u8 {
        PRESET_OFFSET + (self as u8 - 1) * 2 + field as u8
    }

    /// Find which group and field a type code addresses, if any.
    pub fn from_type_code(code: u8) -> Option<(PresetGroup, PresetField)> {
        let offset = code.checked_sub(PRESET_OFFSET)?;
        let group = PresetGroup::try_from(offset / 2 + 1).ok()?;
        let field = if offset % 2 == 0 {
            PresetField::Voltage
        } else {
            PresetField::Current
        };
        Some((group, field))
    }
}

impl TryFrom<u8> for PresetGroup {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PresetGroup as PG;
        match value {
            1 => Ok(PG::Group1),
            2 => Ok(PG::Group2),
            3 => Ok(PG::Group3),
            4 => Ok(PG::Group4),
            5 => Ok(PG::Group5),
            6 => Ok(PG::Group6),
            _ => Err(Error::ValueOutOfRange {
                field: "preset group",
                value: value as f32,
            }),
        }
    }
}

/// A voltage and current pair as stored in one group.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Preset {
    pub voltage: f32,
    pub current: f32,
}
