//! BMS status byte flags

use serde::{Deserialize, Serialize};

/// The status byte carried by [`STATUS`](super::packet_type::STATUS) frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    /// Either temperature probe out of range. One bit is probably hot, the other cold.
    pub const TEMP_OUT_OF_RANGE: u8 = 0x03;
    pub const BATTERY_EMPTY: u8 = 0x04;
    pub const OVERCHARGED: u8 = 0x08;
    pub const CHARGING: u8 = 0x20;

    /// Flags that make a status frame worth forwarding to the controller.
    pub const FORWARDED: u8 =
        Self::TEMP_OUT_OF_RANGE | Self::BATTERY_EMPTY | Self::OVERCHARGED | Self::CHARGING;

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn is_charging(&self) -> bool {
        self.has_flag(Self::CHARGING)
    }

    pub fn is_battery_empty(&self) -> bool {
        self.has_flag(Self::BATTERY_EMPTY)
    }

    pub fn is_temp_out_of_range(&self) -> bool {
        self.has_flag(Self::TEMP_OUT_OF_RANGE)
    }

    pub fn is_overcharged(&self) -> bool {
        self.has_flag(Self::OVERCHARGED)
    }

    /// Whether any flag the controller must see is raised.
    pub fn needs_forwarding(&self) -> bool {
        self.has_flag(Self::FORWARDED)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}
