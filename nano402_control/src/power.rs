//! CiA 402 power state machine.
//!
//! Walks the drive through the standard power graph by editing bits 0–3
//! and 7 of the control word, re-reading the status word after every step.
//!
//! ```text
//!  NotReadyToSwitchOn ──► SwitchOnDisabled ◄───────────────┐
//!                            │  ▲ disable voltage          │
//!                   shutdown ▼  │                          │
//!                         ReadyToSwitchOn                  │
//!                            │  ▲ shutdown                 │
//!                  switch on ▼  │                          │
//!                          SwitchedOn                      │
//!                            │  ▲ disable operation        │
//!           enable operation ▼  │                          │
//!                        OperationEnabled ──quick stop──► QuickStopActive
//!
//!  any ──► FaultReactionActive ──► Fault ──fault reset──► SwitchOnDisabled
//! ```

use crate::error::{DriveError, DriveResult, ProtocolError};
use crate::handle::DriveRef;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::state::PowerState;
use nano402_common::drive::words::{ControlWord, PowerCommand};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fault-reset pulses `enable_operation` issues before giving up.
pub const MAX_FAULT_RESETS: u8 = 2;

/// Pause before re-reading a drive that is still reacting to a fault.
const FAULT_REACTION_SETTLE: Duration = Duration::from_millis(10);

/// Settle pauses `enable_operation` waits in `FaultReactionActive` before
/// reporting a stall. With [`FAULT_REACTION_SETTLE`] this allows one second
/// for the fault reaction to finish.
pub const MAX_FAULT_REACTION_POLLS: u16 = 100;

// ─── PowerStateMachine ──────────────────────────────────────────────

/// Power state machine for one connected drive.
///
/// Holds no state of its own: every decision starts from a fresh status
/// word read.
pub struct PowerStateMachine<'a, R: RegisterAccess> {
    drive: DriveRef<'a, R>,
}

impl<'a, R: RegisterAccess> PowerStateMachine<'a, R> {
    pub const fn new(bus: &'a R, device: &'a R::Device) -> Self {
        Self {
            drive: DriveRef::new(bus, device),
        }
    }

    #[inline]
    pub const fn drive(&self) -> DriveRef<'a, R> {
        self.drive
    }

    /// Decode the current power state.
    pub fn current_state(&self) -> DriveResult<PowerState> {
        self.observe("current_state")
    }

    fn observe(&self, operation: &'static str) -> DriveResult<PowerState> {
        let status = self.drive.status_word()?;
        match PowerState::from_status_word(status.bits()) {
            Some(state) => {
                debug!(state = %state, status = format_args!("{:#06x}", status.bits()), "power state");
                Ok(state)
            }
            None => Err(DriveError::protocol(
                operation,
                ProtocolError::UnknownState(status.bits()),
            )),
        }
    }

    fn command(&self, command: PowerCommand) -> DriveResult<()> {
        debug!(command = command.name(), "power transition");
        let word = command.apply(self.drive.control_word()?);
        self.drive.write_control_word(word)
    }

    /// One fault-reset pulse: bit 7 low, then high.
    fn pulse_fault_reset(&self) -> DriveResult<()> {
        let mut word = self.drive.control_word()?;
        word.remove(ControlWord::FAULT_RESET);
        self.drive.write_control_word(word)?;
        word.insert(ControlWord::FAULT_RESET);
        self.drive.write_control_word(word)
    }

    fn release_fault_reset(&self) -> DriveResult<()> {
        self.drive
            .update_control_word(|w| w.remove(ControlWord::FAULT_RESET))
            .map(|_| ())
    }

    /// Leave quick stop: drop bit 2, then immediately re-enable.
    ///
    /// Two writes with no status read between them.
    fn restart_after_quick_stop(&self) -> DriveResult<()> {
        let mut word = self.drive.control_word()?;
        word.remove(ControlWord::QUICK_STOP);
        self.drive.write_control_word(word)?;
        self.drive
            .write_control_word(PowerCommand::EnableOperation.apply(word))
    }

    /// Bring the drive to `OperationEnabled`.
    ///
    /// Loops while the observed state keeps changing. `Fault` may repeat:
    /// it consumes one of [`MAX_FAULT_RESETS`] pulses per visit, and the
    /// visit after the last pulse fails with `FaultNotCleared`.
    /// `FaultReactionActive` may repeat for [`MAX_FAULT_REACTION_POLLS`]
    /// settle pauses. Any other repeated state fails with
    /// `TransitionStalled`.
    pub fn enable_operation(&self) -> DriveResult<()> {
        const OP: &str = "enable_operation";

        let mut previous: Option<PowerState> = None;
        let mut fault_resets: u8 = 0;
        let mut reaction_polls: u16 = 0;

        loop {
            let state = self.observe(OP)?;
            let may_repeat = matches!(
                state,
                PowerState::Fault | PowerState::FaultReactionActive
            );
            if previous == Some(state) && !may_repeat {
                return Err(DriveError::protocol(
                    OP,
                    ProtocolError::TransitionStalled(state),
                ));
            }
            previous = Some(state);

            match state {
                PowerState::NotReadyToSwitchOn => {
                    return Err(DriveError::protocol(OP, ProtocolError::NotReadyToSwitchOn));
                }
                PowerState::SwitchOnDisabled => self.command(PowerCommand::Shutdown)?,
                PowerState::ReadyToSwitchOn => self.command(PowerCommand::SwitchOn)?,
                PowerState::SwitchedOn => self.command(PowerCommand::EnableOperation)?,
                PowerState::OperationEnabled => {
                    info!("operation enabled");
                    return Ok(());
                }
                PowerState::QuickStopActive => {
                    warn!("restarting after quick stop");
                    self.restart_after_quick_stop()?;
                }
                PowerState::FaultReactionActive => {
                    if reaction_polls >= MAX_FAULT_REACTION_POLLS {
                        return Err(DriveError::protocol(
                            OP,
                            ProtocolError::TransitionStalled(state),
                        ));
                    }
                    reaction_polls += 1;
                    debug!(poll = reaction_polls, "waiting for fault reaction");
                    self.drive.sleep(FAULT_REACTION_SETTLE);
                }
                PowerState::Fault => {
                    if fault_resets >= MAX_FAULT_RESETS {
                        self.release_fault_reset()?;
                        return Err(DriveError::protocol(
                            OP,
                            ProtocolError::FaultNotCleared(fault_resets),
                        ));
                    }
                    fault_resets += 1;
                    warn!(attempt = fault_resets, "resetting fault");
                    self.pulse_fault_reset()?;
                }
            }
        }
    }

    /// Leave `OperationEnabled` for `SwitchedOn`. Resets a pending fault.
    pub fn disable_operation(&self) -> DriveResult<()> {
        const OP: &str = "disable_operation";

        match self.observe(OP)? {
            PowerState::NotReadyToSwitchOn => {
                Err(DriveError::protocol(OP, ProtocolError::NotReadyToSwitchOn))
            }
            PowerState::Fault => {
                warn!("resetting fault");
                self.pulse_fault_reset()
            }
            PowerState::OperationEnabled => {
                self.command(PowerCommand::DisableOperation)?;
                if self.observe(OP)? == PowerState::OperationEnabled {
                    return Err(DriveError::protocol(OP, ProtocolError::CouldNotDisable));
                }
                debug!("operation disabled");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Move towards `ReadyToSwitchOn`. Calling it again is harmless.
    pub fn shutdown(&self) -> DriveResult<()> {
        const OP: &str = "shutdown";

        match self.observe(OP)? {
            PowerState::NotReadyToSwitchOn => {
                Err(DriveError::protocol(OP, ProtocolError::NotReadyToSwitchOn))
            }
            PowerState::Fault => {
                warn!("resetting fault");
                self.pulse_fault_reset()
            }
            PowerState::QuickStopActive => self.command(PowerCommand::DisableVoltage),
            PowerState::OperationEnabled
            | PowerState::SwitchedOn
            | PowerState::SwitchOnDisabled => self.command(PowerCommand::Shutdown),
            PowerState::ReadyToSwitchOn | PowerState::FaultReactionActive => Ok(()),
        }
    }

    /// Quick stop an enabled drive. No-op in every other state.
    pub fn quick_stop(&self) -> DriveResult<()> {
        const OP: &str = "quick_stop";

        if self.observe(OP)? != PowerState::OperationEnabled {
            return Ok(());
        }
        self.command(PowerCommand::QuickStop)?;
        if self.observe(OP)? == PowerState::OperationEnabled {
            return Err(DriveError::protocol(OP, ProtocolError::QuickStopFailed));
        }
        info!("quick stop active");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBus;
    use nano402_common::od;

    const SOD: u16 = 0x0040;
    const RTSO: u16 = 0x0021;
    const SO: u16 = 0x0023;
    const OE: u16 = 0x0027;
    const QSA: u16 = 0x0007;
    const FRA: u16 = 0x000F;
    const FAULT: u16 = 0x0008;
    const NOT_READY: u16 = 0x0000;

    fn kind(result: DriveResult<()>) -> ProtocolError {
        match result {
            Err(DriveError::Protocol { kind, .. }) => kind,
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn current_state_decodes_every_template() {
        for state in PowerState::ALL {
            let bus = ScriptedBus::new();
            bus.script_status(&[state.status_bits() | 0x0210]);
            let power = PowerStateMachine::new(&bus, &());
            assert_eq!(power.current_state().unwrap(), state);
        }
    }

    #[test]
    fn current_state_rejects_unknown_pattern() {
        let bus = ScriptedBus::new();
        bus.script_status(&[0x0001]);
        let power = PowerStateMachine::new(&bus, &());
        assert!(matches!(
            power.current_state(),
            Err(DriveError::Protocol {
                operation: "current_state",
                kind: ProtocolError::UnknownState(0x0001)
            })
        ));
    }

    #[test]
    fn enable_walks_from_switch_on_disabled() {
        let bus = ScriptedBus::new();
        bus.script_status(&[SOD, RTSO, SO, OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();

        assert_eq!(bus.control_word_writes(), vec![0x0006, 0x0007, 0x000F]);
        assert_eq!(bus.reads_of(od::STATUS_WORD), 4);
    }

    #[test]
    fn enable_on_enabled_drive_writes_nothing() {
        let bus = ScriptedBus::new();
        bus.script_status(&[OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();
        assert!(bus.control_word_writes().is_empty());
    }

    #[test]
    fn enable_fails_on_not_ready() {
        let bus = ScriptedBus::new();
        bus.script_status(&[NOT_READY]);
        let power = PowerStateMachine::new(&bus, &());

        assert_eq!(
            kind(power.enable_operation()),
            ProtocolError::NotReadyToSwitchOn
        );
        assert!(bus.control_word_writes().is_empty());
    }

    #[test]
    fn enable_gives_up_after_two_fault_resets() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FAULT]);
        let power = PowerStateMachine::new(&bus, &());

        assert_eq!(
            kind(power.enable_operation()),
            ProtocolError::FaultNotCleared(MAX_FAULT_RESETS)
        );
        assert_eq!(bus.fault_reset_pulses(), 2);
        assert_eq!(bus.reads_of(od::STATUS_WORD), 3);
        // The reset line is released on the way out.
        assert_eq!(bus.control_word_writes().last(), Some(&0x0000));
    }

    #[test]
    fn enable_recovers_from_fault_after_one_reset() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FAULT, SOD, RTSO, SO, OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();

        assert_eq!(bus.fault_reset_pulses(), 1);
        // Shutdown clears bit 7 again.
        assert_eq!(
            bus.control_word_writes(),
            vec![0x0000, 0x0080, 0x0006, 0x0007, 0x000F]
        );
    }

    #[test]
    fn enable_restarts_after_quick_stop_with_two_writes() {
        let bus = ScriptedBus::new();
        bus.set(od::CONTROL_WORD, 0x000B);
        bus.script_status(&[QSA, OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();

        assert_eq!(bus.control_word_writes(), vec![0x000B, 0x000F]);
        assert_eq!(bus.reads_of(od::STATUS_WORD), 2);
    }

    #[test]
    fn enable_reports_stalled_transition() {
        let bus = ScriptedBus::new();
        bus.script_status(&[SOD, SOD]);
        let power = PowerStateMachine::new(&bus, &());

        assert_eq!(
            kind(power.enable_operation()),
            ProtocolError::TransitionStalled(PowerState::SwitchOnDisabled)
        );
        assert_eq!(bus.control_word_writes(), vec![0x0006]);
    }

    #[test]
    fn enable_waits_out_fault_reaction() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FRA, FAULT, SOD, RTSO, SO, OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();
        assert_eq!(bus.sleeps(), vec![FAULT_REACTION_SETTLE]);
    }

    #[test]
    fn enable_waits_through_a_long_fault_reaction() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FRA, FRA, FRA, FRA, FAULT, SOD, RTSO, SO, OE]);
        let power = PowerStateMachine::new(&bus, &());

        power.enable_operation().unwrap();
        assert_eq!(bus.sleeps(), vec![FAULT_REACTION_SETTLE; 4]);
        assert_eq!(bus.fault_reset_pulses(), 1);
    }

    #[test]
    fn enable_gives_up_on_endless_fault_reaction() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FRA]);
        let power = PowerStateMachine::new(&bus, &());

        assert_eq!(
            kind(power.enable_operation()),
            ProtocolError::TransitionStalled(PowerState::FaultReactionActive)
        );
        assert_eq!(bus.sleeps().len(), usize::from(MAX_FAULT_REACTION_POLLS));
        assert!(bus.control_word_writes().is_empty());
    }

    #[test]
    fn enable_terminates_from_every_reachable_state() {
        // A drive that never reacts must still end the loop.
        for state in PowerState::ALL {
            let bus = ScriptedBus::new();
            bus.script_status(&[state.status_bits()]);
            let power = PowerStateMachine::new(&bus, &());
            let result = power.enable_operation();
            let max_reads = if state == PowerState::FaultReactionActive {
                usize::from(MAX_FAULT_REACTION_POLLS) + 1
            } else {
                3
            };
            assert!(bus.reads_of(od::STATUS_WORD) <= max_reads, "{state:?}");
            assert_eq!(result.is_ok(), state == PowerState::OperationEnabled);
        }
    }

    #[test]
    fn disable_issues_one_transition() {
        let bus = ScriptedBus::new();
        bus.set(od::CONTROL_WORD, 0x001F);
        bus.script_status(&[OE, SO]);
        let power = PowerStateMachine::new(&bus, &());

        power.disable_operation().unwrap();
        assert_eq!(bus.control_word_writes(), vec![0x0017]);
    }

    #[test]
    fn disable_fails_if_drive_stays_enabled() {
        let bus = ScriptedBus::new();
        bus.script_status(&[OE]);
        let power = PowerStateMachine::new(&bus, &());

        assert_eq!(kind(power.disable_operation()), ProtocolError::CouldNotDisable);
        assert_eq!(bus.control_word_writes().len(), 1);
    }

    #[test]
    fn disable_resets_fault() {
        let bus = ScriptedBus::new();
        bus.script_status(&[FAULT]);
        let power = PowerStateMachine::new(&bus, &());

        power.disable_operation().unwrap();
        assert_eq!(bus.fault_reset_pulses(), 1);
    }

    #[test]
    fn disable_is_a_no_op_when_not_enabled() {
        let bus = ScriptedBus::new();
        bus.script_status(&[SO]);
        let power = PowerStateMachine::new(&bus, &());

        power.disable_operation().unwrap();
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn shutdown_per_state() {
        let cases: [(u16, Vec<u16>); 6] = [
            (OE, vec![0x0006]),
            (SO, vec![0x0006]),
            (SOD, vec![0x0006]),
            (RTSO, vec![]),
            (QSA, vec![0x0004]),
            (FAULT, vec![0x0006, 0x0086]),
        ];
        for (status, expected) in cases {
            let bus = ScriptedBus::new();
            bus.set(od::CONTROL_WORD, 0x0006);
            bus.script_status(&[status]);
            let power = PowerStateMachine::new(&bus, &());

            power.shutdown().unwrap();
            assert_eq!(bus.control_word_writes(), expected, "status {status:#06x}");
        }
    }

    #[test]
    fn shutdown_fails_on_not_ready() {
        let bus = ScriptedBus::new();
        bus.script_status(&[NOT_READY]);
        let power = PowerStateMachine::new(&bus, &());
        assert_eq!(kind(power.shutdown()), ProtocolError::NotReadyToSwitchOn);
    }

    #[test]
    fn quick_stop_clears_bit_two() {
        let bus = ScriptedBus::new();
        bus.set(od::CONTROL_WORD, 0x000F);
        bus.script_status(&[OE, QSA]);
        let power = PowerStateMachine::new(&bus, &());

        power.quick_stop().unwrap();
        assert_eq!(bus.control_word_writes(), vec![0x000B]);
    }

    #[test]
    fn quick_stop_fails_if_still_enabled() {
        let bus = ScriptedBus::new();
        bus.script_status(&[OE]);
        let power = PowerStateMachine::new(&bus, &());
        assert_eq!(kind(power.quick_stop()), ProtocolError::QuickStopFailed);
    }

    #[test]
    fn quick_stop_ignores_disabled_drive() {
        let bus = ScriptedBus::new();
        bus.script_status(&[SO]);
        let power = PowerStateMachine::new(&bus, &());
        power.quick_stop().unwrap();
        assert!(bus.writes().is_empty());
    }
}
