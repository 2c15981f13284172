//! Control word (0x6040) and status word (0x6041) bit sets.
//!
//! Both words carry mode-specific and manufacturer bits the controllers
//! never touch, so every value is built with `from_bits_retain` and
//! modified in place: a read-modify-write must hand back the bits it did
//! not own.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

bitflags! {
    /// DS402 control word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON        = 1 << 0;
        const ENABLE_VOLTAGE   = 1 << 1;
        /// Active low: cleared requests a quick stop.
        const QUICK_STOP       = 1 << 2;
        const ENABLE_OPERATION = 1 << 3;
        /// New set-point (profile position) / start (homing, auto setup).
        const START            = 1 << 4;
        /// Profile position: apply the new set-point immediately.
        const CHANGE_IMMEDIATELY = 1 << 5;
        /// Profile position: target is relative.
        const RELATIVE         = 1 << 6;
        /// Rising edge resets a fault.
        const FAULT_RESET      = 1 << 7;
        const HALT             = 1 << 8;
    }
}

bitflags! {
    /// DS402 status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON = 1 << 0;
        const SWITCHED_ON        = 1 << 1;
        const OPERATION_ENABLED  = 1 << 2;
        const FAULT              = 1 << 3;
        const VOLTAGE_ENABLED    = 1 << 4;
        /// Active low: cleared while a quick stop is active.
        const QUICK_STOP         = 1 << 5;
        const SWITCH_ON_DISABLED = 1 << 6;
        const WARNING            = 1 << 7;
        const REMOTE             = 1 << 9;
        /// Target reached (op-specific bit 10).
        const TARGET_REACHED     = 1 << 10;
        const INTERNAL_LIMIT     = 1 << 11;
        /// Op-specific: set-point acknowledge, homing attained, auto setup done.
        const OP_SPECIFIC_12     = 1 << 12;
        /// Op-specific: following error, homing error.
        const OP_SPECIFIC_13     = 1 << 13;
    }
}

const_assert_eq!(core::mem::size_of::<ControlWord>(), 2);
const_assert_eq!(core::mem::size_of::<StatusWord>(), 2);

// ─── Power State Transitions ────────────────────────────────────────

/// Control-word edits that request a power-state transition.
///
/// Each edit touches only bits 0–3 and 7, leaving mode bits untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    /// Transitions 2, 6, 8: towards ReadyToSwitchOn.
    Shutdown,
    /// Transition 3: ReadyToSwitchOn → SwitchedOn.
    SwitchOn,
    /// Transition 5: OperationEnabled → SwitchedOn. Same pattern as switch-on.
    DisableOperation,
    /// Transition 4: SwitchedOn → OperationEnabled.
    EnableOperation,
    /// Transitions 7, 9, 10, 12: towards SwitchOnDisabled.
    DisableVoltage,
    /// Transition 11: OperationEnabled → QuickStopActive.
    QuickStop,
}

impl PowerCommand {
    /// Apply this command to the current control word.
    pub fn apply(self, word: ControlWord) -> ControlWord {
        let mut word = word;
        match self {
            Self::Shutdown => {
                word.remove(ControlWord::SWITCH_ON | ControlWord::FAULT_RESET);
                word.insert(ControlWord::ENABLE_VOLTAGE | ControlWord::QUICK_STOP);
            }
            Self::SwitchOn | Self::DisableOperation => {
                word.insert(
                    ControlWord::SWITCH_ON | ControlWord::ENABLE_VOLTAGE | ControlWord::QUICK_STOP,
                );
                word.remove(ControlWord::ENABLE_OPERATION | ControlWord::FAULT_RESET);
            }
            Self::EnableOperation => {
                word.insert(
                    ControlWord::SWITCH_ON
                        | ControlWord::ENABLE_VOLTAGE
                        | ControlWord::QUICK_STOP
                        | ControlWord::ENABLE_OPERATION,
                );
                word.remove(ControlWord::FAULT_RESET);
            }
            Self::DisableVoltage => {
                word.remove(ControlWord::ENABLE_VOLTAGE | ControlWord::FAULT_RESET);
            }
            Self::QuickStop => {
                word.insert(ControlWord::ENABLE_VOLTAGE);
                word.remove(ControlWord::QUICK_STOP | ControlWord::FAULT_RESET);
            }
        }
        word
    }

    /// Decode the command a drive sees in `word`.
    ///
    /// Disable operation shares the switch-on pattern and decodes as
    /// `SwitchOn`. `None` while the fault-reset bit masks the command.
    pub const fn from_control_word(word: ControlWord) -> Option<Self> {
        let bits = word.bits();
        if bits & 0x0082 == 0x0000 {
            Some(Self::DisableVoltage)
        } else if bits & 0x0086 == 0x0002 {
            Some(Self::QuickStop)
        } else if bits & 0x0087 == 0x0006 {
            Some(Self::Shutdown)
        } else if bits & 0x008F == 0x0007 {
            Some(Self::SwitchOn)
        } else if bits & 0x008F == 0x000F {
            Some(Self::EnableOperation)
        } else {
            None
        }
    }

    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::SwitchOn => "switch on",
            Self::DisableOperation => "disable operation",
            Self::EnableOperation => "enable operation",
            Self::DisableVoltage => "disable voltage",
            Self::QuickStop => "quick stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(bits: u16) -> ControlWord {
        ControlWord::from_bits_retain(bits)
    }

    #[test]
    fn shutdown_sets_voltage_and_quick_stop_only() {
        assert_eq!(PowerCommand::Shutdown.apply(word(0x0000)).bits(), 0x0006);
        // Clears switch-on and fault reset, keeps enable-operation and mode bits.
        assert_eq!(PowerCommand::Shutdown.apply(word(0x009F)).bits(), 0x001E);
    }

    #[test]
    fn switch_on_and_disable_operation_share_a_pattern() {
        for start in [0x0006, 0x000F, 0x0080, 0x0130] {
            assert_eq!(
                PowerCommand::SwitchOn.apply(word(start)),
                PowerCommand::DisableOperation.apply(word(start))
            );
        }
        assert_eq!(PowerCommand::SwitchOn.apply(word(0x0006)).bits(), 0x0007);
        assert_eq!(PowerCommand::DisableOperation.apply(word(0x001F)).bits(), 0x0017);
    }

    #[test]
    fn enable_operation_sets_low_nibble_and_clears_reset() {
        assert_eq!(PowerCommand::EnableOperation.apply(word(0x0087)).bits(), 0x000F);
        assert_eq!(PowerCommand::EnableOperation.apply(word(0x0170)).bits(), 0x017F);
    }

    #[test]
    fn quick_stop_clears_bit_two() {
        assert_eq!(PowerCommand::QuickStop.apply(word(0x000F)).bits(), 0x000B);
    }

    #[test]
    fn disable_voltage_clears_bit_one_and_reset() {
        assert_eq!(PowerCommand::DisableVoltage.apply(word(0x008B)).bits(), 0x0009);
    }

    #[test]
    fn drive_side_decoding_inverts_every_command() {
        for command in [
            PowerCommand::Shutdown,
            PowerCommand::SwitchOn,
            PowerCommand::EnableOperation,
            PowerCommand::DisableVoltage,
            PowerCommand::QuickStop,
        ] {
            let word = command.apply(word(0x0170));
            assert_eq!(PowerCommand::from_control_word(word), Some(command));
        }
        assert_eq!(
            PowerCommand::from_control_word(PowerCommand::DisableOperation.apply(word(0x000F))),
            Some(PowerCommand::SwitchOn)
        );
    }

    #[test]
    fn fault_reset_bit_masks_commands() {
        assert_eq!(PowerCommand::from_control_word(word(0x008F)), None);
        assert_eq!(PowerCommand::from_control_word(word(0x0086)), None);
        assert_eq!(
            PowerCommand::from_control_word(word(0x0000)),
            Some(PowerCommand::DisableVoltage)
        );
    }

    #[test]
    fn unknown_bits_survive_edits() {
        let with_manufacturer_bits = word(0xF800);
        let edited = PowerCommand::EnableOperation.apply(with_manufacturer_bits);
        assert_eq!(edited.bits() & 0xF800, 0xF800);
    }
}
