//! Object dictionary addressing.
//!
//! Every drive interaction is a read or write of an integer at an
//! `(index, subindex)` address. This module defines the address type, the
//! bit widths a write can carry, and the fixed register map used by the
//! controllers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An object dictionary address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OdIndex {
    /// 16-bit object index, e.g. `0x6041`.
    pub index: u16,
    /// 8-bit subindex.
    pub subindex: u8,
}

impl OdIndex {
    #[inline]
    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }

    /// Same object, different subindex.
    #[inline]
    pub const fn with_subindex(self, subindex: u8) -> Self {
        Self::new(self.index, subindex)
    }
}

impl fmt::Display for OdIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{:02x}", self.index, self.subindex)
    }
}

/// Bit width of an integer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BitWidth {
    Bits8 = 8,
    Bits16 = 16,
    Bits32 = 32,
}

impl BitWidth {
    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Truncate `value` to this width, two's complement.
    #[inline]
    pub const fn truncate(self, value: i64) -> u64 {
        match self {
            Self::Bits8 => value as u8 as u64,
            Self::Bits16 => value as u16 as u64,
            Self::Bits32 => value as u32 as u64,
        }
    }
}

// ─── Communication Profile ──────────────────────────────────────────

/// Pre-defined error field (device fault history). Subindex 0 holds the count.
pub const ERROR_HISTORY: u16 = 0x1003;
/// Manufacturer device name (string).
pub const DEVICE_NAME: OdIndex = OdIndex::new(0x1008, 0x00);
/// Store parameters. The subindex selects the save group.
pub const STORE_PARAMETERS: u16 = 0x1010;
/// ASCII "save", written to a store-parameters subindex to start a save.
pub const SAVE_SIGNATURE: u32 = 0x6576_6173;

// ─── Manufacturer Specific ──────────────────────────────────────────

/// Motor pole pair count.
pub const POLE_PAIR_COUNT: OdIndex = OdIndex::new(0x2030, 0x00);
/// Maximum permitted motor current (motor protection) [mA].
pub const MAX_MOTOR_CURRENT: OdIndex = OdIndex::new(0x2031, 0x00);
/// Open-loop idle current [mA].
pub const IDLE_CURRENT: OdIndex = OdIndex::new(0x2037, 0x00);
/// Rated motor current [mA].
pub const RATED_CURRENT: OdIndex = OdIndex::new(0x203B, 0x01);
/// Maximum duration of the peak current [ms].
pub const MAX_CURRENT_DURATION: OdIndex = OdIndex::new(0x203B, 0x02);
/// Motor drive submode select: bit 0 closed loop, bit 3 current
/// reduction, bit 6 BLDC.
pub const MOTOR_DRIVE_SUBMODE: OdIndex = OdIndex::new(0x3202, 0x00);
/// Digital input special function enable (bit 0 negative, bit 1 positive
/// limit switch).
pub const INPUT_SPECIAL_FUNCTION: OdIndex = OdIndex::new(0x3240, 0x01);
/// Digital input inversion (normally closed logic).
pub const INPUT_FUNCTION_INVERTED: OdIndex = OdIndex::new(0x3240, 0x02);
/// Digital input voltage range select (set = 24 V).
pub const INPUT_RANGE_SELECT: OdIndex = OdIndex::new(0x3240, 0x06);
/// Limit switch error option code.
pub const LIMIT_SWITCH_ERROR_OPTION: OdIndex = OdIndex::new(0x3701, 0x00);

// ─── Device Profile (CiA 402) ───────────────────────────────────────

pub const CONTROL_WORD: OdIndex = OdIndex::new(0x6040, 0x00);
pub const STATUS_WORD: OdIndex = OdIndex::new(0x6041, 0x00);
/// vl target velocity (INTEGER16).
pub const VL_TARGET_VELOCITY: OdIndex = OdIndex::new(0x6042, 0x00);
/// vl velocity demand (INTEGER16).
pub const VL_VELOCITY_DEMAND: OdIndex = OdIndex::new(0x6043, 0x00);
/// vl velocity actual value (INTEGER16).
pub const VL_VELOCITY_ACTUAL: OdIndex = OdIndex::new(0x6044, 0x00);
/// vl velocity acceleration: subindex 1 delta speed, 2 delta time.
pub const VL_ACCELERATION: u16 = 0x6048;
/// vl velocity deceleration: subindex 1 delta speed, 2 delta time.
pub const VL_DECELERATION: u16 = 0x6049;
/// Halt option code.
pub const HALT_OPTION: OdIndex = OdIndex::new(0x605D, 0x00);
pub const MODE_OF_OPERATION: OdIndex = OdIndex::new(0x6060, 0x00);
pub const MODE_OF_OPERATION_DISPLAY: OdIndex = OdIndex::new(0x6061, 0x00);
pub const POSITION_ACTUAL: OdIndex = OdIndex::new(0x6064, 0x00);
pub const VELOCITY_ACTUAL: OdIndex = OdIndex::new(0x606C, 0x00);
pub const TARGET_POSITION: OdIndex = OdIndex::new(0x607A, 0x00);
pub const MAX_MOTOR_SPEED: OdIndex = OdIndex::new(0x6080, 0x00);
pub const PROFILE_VELOCITY: OdIndex = OdIndex::new(0x6081, 0x00);
pub const PROFILE_ACCELERATION: OdIndex = OdIndex::new(0x6083, 0x00);
/// Gear ratio: subindex 1 motor revolutions, 2 shaft revolutions.
pub const GEAR_RATIO: u16 = 0x6091;
/// Feed constant: subindex 1 feed, 2 shaft revolutions.
pub const FEED_CONSTANT: u16 = 0x6092;
pub const HOMING_METHOD: OdIndex = OdIndex::new(0x6098, 0x00);
/// Speed during search for switch.
pub const HOMING_SPEED_SWITCH: OdIndex = OdIndex::new(0x6099, 0x01);
/// Speed during search for zero.
pub const HOMING_SPEED_ZERO: OdIndex = OdIndex::new(0x6099, 0x02);
pub const HOMING_ACCELERATION: OdIndex = OdIndex::new(0x609A, 0x00);
/// SI unit position: unit in bits 16–23, exponent in bits 24–31.
pub const SI_UNIT_POSITION: OdIndex = OdIndex::new(0x60A8, 0x00);
/// SI unit velocity: time base in bits 8–15, unit in 16–23, exponent in 24–31.
pub const SI_UNIT_VELOCITY: OdIndex = OdIndex::new(0x60A9, 0x00);
/// Digital inputs; bits 16–23 carry the physical inputs.
pub const DIGITAL_INPUTS: OdIndex = OdIndex::new(0x60FD, 0x00);
