//! Derived drive states and the mode-of-operation enum.
//!
//! `PowerState` is never stored. It is recomputed from a live status word
//! every time, by matching the word against eight fixed templates in a
//! fixed priority order. A word that matches none of them is a protocol
//! error, reported by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Power State ────────────────────────────────────────────────────

/// The eight standard DS402 power states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PowerState {
    NotReadyToSwitchOn = 0,
    SwitchOnDisabled = 1,
    ReadyToSwitchOn = 2,
    SwitchedOn = 3,
    OperationEnabled = 4,
    QuickStopActive = 5,
    FaultReactionActive = 6,
    Fault = 7,
}

/// `(state, mask, value)` templates in decode priority order.
///
/// Bit 4 (voltage enabled) and bit 7 (warning) never participate.
const POWER_STATE_TEMPLATES: [(PowerState, u16, u16); 8] = [
    (PowerState::NotReadyToSwitchOn, 0x004F, 0x0000),
    (PowerState::SwitchOnDisabled, 0x004F, 0x0040),
    (PowerState::ReadyToSwitchOn, 0x006F, 0x0021),
    (PowerState::SwitchedOn, 0x006F, 0x0023),
    (PowerState::OperationEnabled, 0x006F, 0x0027),
    (PowerState::QuickStopActive, 0x006F, 0x0007),
    (PowerState::FaultReactionActive, 0x004F, 0x000F),
    (PowerState::Fault, 0x004F, 0x0008),
];

impl PowerState {
    /// All states, in decode priority order.
    pub const ALL: [Self; 8] = [
        Self::NotReadyToSwitchOn,
        Self::SwitchOnDisabled,
        Self::ReadyToSwitchOn,
        Self::SwitchedOn,
        Self::OperationEnabled,
        Self::QuickStopActive,
        Self::FaultReactionActive,
        Self::Fault,
    ];

    /// Decode a status word. `None` if no template matches.
    pub fn from_status_word(word: u16) -> Option<Self> {
        POWER_STATE_TEMPLATES
            .iter()
            .find(|(_, mask, value)| word & mask == *value)
            .map(|(state, _, _)| *state)
    }

    /// Mask and value identifying this state in a status word.
    pub const fn template(self) -> (u16, u16) {
        let (_, mask, value) = POWER_STATE_TEMPLATES[self as usize];
        (mask, value)
    }

    /// Canonical status-word bits for this state (template value only).
    pub const fn status_bits(self) -> u16 {
        self.template().1
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NotReadyToSwitchOn => "Not ready to switch on",
            Self::SwitchOnDisabled => "Switch on disabled",
            Self::ReadyToSwitchOn => "Ready to switch on",
            Self::SwitchedOn => "Switched on",
            Self::OperationEnabled => "Operation enabled",
            Self::QuickStopActive => "Quick stop active",
            Self::FaultReactionActive => "Fault reaction active",
            Self::Fault => "Fault",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Operation Mode ─────────────────────────────────────────────────

/// Mode of operation (0x6060 / 0x6061, INTEGER8).
///
/// May only be changed while the drive is not in `OperationEnabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum OperationMode {
    /// Manufacturer specific: motor parameter identification.
    AutoSetup = -2,
    /// Manufacturer specific: clock/direction input.
    ClockDirection = -1,
    No = 0,
    ProfilePosition = 1,
    Velocity = 2,
    ProfileVelocity = 3,
    ProfileTorque = 4,
    Homing = 6,
    InterpolatedPosition = 7,
    CyclicSynchronousPosition = 8,
    CyclicSynchronousVelocity = 9,
    CyclicSynchronousTorque = 10,
}

impl OperationMode {
    /// Convert from the raw register value. Returns `None` for unassigned codes.
    #[inline]
    pub const fn from_i8(value: i8) -> Option<Self> {
        match value {
            -2 => Some(Self::AutoSetup),
            -1 => Some(Self::ClockDirection),
            0 => Some(Self::No),
            1 => Some(Self::ProfilePosition),
            2 => Some(Self::Velocity),
            3 => Some(Self::ProfileVelocity),
            4 => Some(Self::ProfileTorque),
            6 => Some(Self::Homing),
            7 => Some(Self::InterpolatedPosition),
            8 => Some(Self::CyclicSynchronousPosition),
            9 => Some(Self::CyclicSynchronousVelocity),
            10 => Some(Self::CyclicSynchronousTorque),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_i8(self) -> i8 {
        self as i8
    }

    /// Modes in which the generic halt bit is honoured.
    #[inline]
    pub const fn supports_halt(self) -> bool {
        matches!(
            self,
            Self::ProfilePosition
                | Self::Velocity
                | Self::ProfileVelocity
                | Self::ProfileTorque
                | Self::InterpolatedPosition
        )
    }
}

impl Default for OperationMode {
    fn default() -> Self {
        Self::No
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i8())
    }
}
