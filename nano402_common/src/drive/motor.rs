//! Motor electrical parameters and commutation mode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SUBMODE_CLOSED_LOOP: u32 = 1 << 0;
const SUBMODE_CURRENT_REDUCTION: u32 = 1 << 3;
const SUBMODE_BLDC: u32 = 1 << 6;

/// Raw drive mode tag with no matching [`DriveMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown drive mode tag {0}")]
pub struct UnknownDriveMode(pub u32);

/// Commutation mode, stored in the motor drive submode register (0x3202).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DriveMode {
    StepperOpenLoopNoReduction = 0,
    StepperClosedLoop = 1,
    StepperOpenLoopWithReduction = 8,
    /// Brushless DC. The tag is bits 0 and 6 together.
    Bldc = 65,
}

impl DriveMode {
    pub const ALL: [Self; 4] = [
        Self::StepperOpenLoopNoReduction,
        Self::StepperClosedLoop,
        Self::StepperOpenLoopWithReduction,
        Self::Bldc,
    ];

    #[inline]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    #[inline]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::StepperOpenLoopNoReduction),
            1 => Some(Self::StepperClosedLoop),
            8 => Some(Self::StepperOpenLoopWithReduction),
            65 => Some(Self::Bldc),
            _ => None,
        }
    }

    /// New submode register value for this mode.
    ///
    /// `Bldc` ORs its tag into the register. The stepper modes set and
    /// clear individual bits instead, so a BLDC write leaves bit 3 as it was.
    pub const fn apply_to(self, raw: u32) -> u32 {
        match self {
            Self::Bldc => raw | Self::Bldc.tag(),
            Self::StepperClosedLoop => (raw & !SUBMODE_BLDC) | SUBMODE_CLOSED_LOOP,
            Self::StepperOpenLoopNoReduction => {
                raw & !(SUBMODE_BLDC | SUBMODE_CLOSED_LOOP | SUBMODE_CURRENT_REDUCTION)
            }
            Self::StepperOpenLoopWithReduction => {
                (raw & !(SUBMODE_BLDC | SUBMODE_CLOSED_LOOP)) | SUBMODE_CURRENT_REDUCTION
            }
        }
    }

    /// Infer the mode from a submode register value.
    ///
    /// Priority: bit 0 clear is open loop (bit 3 picks the reduction
    /// variant), then bits 0 and 6 is BLDC, otherwise closed-loop stepper.
    pub const fn from_submode(raw: u32) -> Self {
        if raw & SUBMODE_CLOSED_LOOP == 0 {
            if raw & SUBMODE_CURRENT_REDUCTION != 0 {
                Self::StepperOpenLoopWithReduction
            } else {
                Self::StepperOpenLoopNoReduction
            }
        } else if raw & SUBMODE_BLDC != 0 {
            Self::Bldc
        } else {
            Self::StepperClosedLoop
        }
    }
}

impl TryFrom<u32> for DriveMode {
    type Error = UnknownDriveMode;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(UnknownDriveMode(tag))
    }
}

impl Default for DriveMode {
    fn default() -> Self {
        Self::StepperClosedLoop
    }
}

/// Motor electrical parameters. Currents in mA, durations in ms.
///
/// # TOML Example
///
/// ```toml
/// [motor]
/// pole_pair_count = 50
/// rated_current_ma = 2820
/// max_current_ma = 1000
/// max_current_duration_ms = 100
/// idle_current_ma = 500
/// drive_mode = "stepper_closed_loop"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorParameters {
    /// 0x2030:00
    pub pole_pair_count: u32,
    /// 0x203B:01
    pub rated_current_ma: u32,
    /// 0x2031:00
    pub max_current_ma: u32,
    /// 0x203B:02
    pub max_current_duration_ms: u32,
    /// 0x2037:00
    pub idle_current_ma: u32,
    /// 0x3202:00, bits 0, 3 and 6
    #[serde(default)]
    pub drive_mode: DriveMode,
}
