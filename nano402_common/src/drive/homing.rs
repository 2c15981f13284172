//! Homing types.
//!
//! Defines `HomingState`, `HomingSpeeds` and the profile's `HomingConfig`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Homing method 17: reference run onto the negative end switch.
pub const DEFAULT_HOMING_METHOD: i8 = 17;

const BIT_TARGET_REACHED: u16 = 1 << 10;
const BIT_ATTAINED: u16 = 1 << 12;
const BIT_ERROR: u16 = 1 << 13;

/// Homing progress, derived from status bits 13, 12 and 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HomingState {
    /// Homing procedure is running.
    InProgress = 0,
    /// Interrupted or not started.
    Incomplete = 1,
    /// Attained, but target not yet reached.
    Unachieved = 2,
    /// Completed successfully.
    Completed = 3,
    /// Error detected while the motor is still moving.
    ErrorStillMoving = 4,
    /// Error detected, motor at standstill.
    ErrorHalt = 5,
}

impl HomingState {
    /// Decode from a status word. `None` for the two unassigned
    /// combinations (bits 13 and 12 both set).
    pub const fn from_status_word(word: u16) -> Option<Self> {
        let error = word & BIT_ERROR != 0;
        let attained = word & BIT_ATTAINED != 0;
        let reached = word & BIT_TARGET_REACHED != 0;
        match (error, attained, reached) {
            (false, false, false) => Some(Self::InProgress),
            (false, false, true) => Some(Self::Incomplete),
            (false, true, false) => Some(Self::Unachieved),
            (false, true, true) => Some(Self::Completed),
            (true, false, false) => Some(Self::ErrorStillMoving),
            (true, false, true) => Some(Self::ErrorHalt),
            (true, true, _) => None,
        }
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ErrorStillMoving | Self::ErrorHalt)
    }
}

impl fmt::Display for HomingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InProgress => "in progress",
            Self::Incomplete => "interrupted or not started",
            Self::Unachieved => "attained, target not reached",
            Self::Completed => "completed",
            Self::ErrorStillMoving => "error, motor still moving",
            Self::ErrorHalt => "error, motor halted",
        };
        f.write_str(text)
    }
}

/// Search speeds for a reference run. `to_zero` must be below `to_switch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomingSpeeds {
    /// Speed while searching for zero (0x6099:02).
    pub to_zero: u32,
    /// Speed while searching for the switch (0x6099:01).
    pub to_switch: u32,
}

impl HomingSpeeds {
    #[inline]
    pub const fn is_ordered(&self) -> bool {
        self.to_zero < self.to_switch
    }
}

impl Default for HomingSpeeds {
    fn default() -> Self {
        Self {
            to_zero: 10,
            to_switch: 50,
        }
    }
}

/// Homing section of a drive profile.
///
/// # TOML Example
///
/// ```toml
/// [homing]
/// method = 17
/// speed_to_zero = 10
/// speed_to_switch = 50
/// acceleration = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomingConfig {
    #[serde(default = "default_method")]
    pub method: i8,
    #[serde(default = "default_speed_to_zero")]
    pub speed_to_zero: u32,
    #[serde(default = "default_speed_to_switch")]
    pub speed_to_switch: u32,
    /// Homing acceleration (0x609A). Left untouched when absent.
    #[serde(default)]
    pub acceleration: Option<u32>,
}

fn default_method() -> i8 {
    DEFAULT_HOMING_METHOD
}
fn default_speed_to_zero() -> u32 {
    HomingSpeeds::default().to_zero
}
fn default_speed_to_switch() -> u32 {
    HomingSpeeds::default().to_switch
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            method: DEFAULT_HOMING_METHOD,
            speed_to_zero: default_speed_to_zero(),
            speed_to_switch: default_speed_to_switch(),
            acceleration: None,
        }
    }
}

impl HomingConfig {
    pub const fn speeds(&self) -> HomingSpeeds {
        HomingSpeeds {
            to_zero: self.speed_to_zero,
            to_switch: self.speed_to_switch,
        }
    }
}
