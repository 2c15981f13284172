//! Homing mode (reference run).

use crate::error::{DriveError, DriveResult, ProtocolError};
use crate::mode::ModeController;
use crate::motion::{LimitSwitchReaction, MotionController};
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::homing::{DEFAULT_HOMING_METHOD, HomingSpeeds, HomingState};
use nano402_common::drive::state::OperationMode;
use nano402_common::drive::words::ControlWord;
use nano402_common::od::{self, BitWidth};
use std::ops::Deref;
use std::time::Duration;
use tracing::{debug, info};

pub const HOMING_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct HomingController<'a, R: RegisterAccess> {
    base: MotionController<'a, R>,
}

impl<'a, R: RegisterAccess> HomingController<'a, R> {
    /// Switches the drive to homing mode.
    pub fn new(power: &'a PowerStateMachine<'a, R>) -> DriveResult<Self> {
        let base = MotionController::new(power);
        base.set_mode_of_operation(OperationMode::Homing)?;
        Ok(Self { base })
    }

    /// Set search speeds. `to_zero` must be below `to_switch`; nothing is
    /// written otherwise.
    pub fn set_homing_speed(&self, speeds: HomingSpeeds) -> DriveResult<()> {
        if !speeds.is_ordered() {
            return Err(DriveError::protocol(
                "set_homing_speed",
                ProtocolError::InvalidHomingSpeedOrder {
                    to_zero: speeds.to_zero,
                    to_switch: speeds.to_switch,
                },
            ));
        }
        let drive = self.drive();
        drive.write_u32(od::HOMING_SPEED_ZERO, speeds.to_zero)?;
        drive.write_u32(od::HOMING_SPEED_SWITCH, speeds.to_switch)
    }

    pub fn set_homing_mode(&self, method: i8) -> DriveResult<()> {
        self.drive()
            .write(od::HOMING_METHOD, i64::from(method), BitWidth::Bits8)
    }

    pub fn set_homing_acceleration(&self, acceleration: u32) -> DriveResult<()> {
        self.drive().write_u32(od::HOMING_ACCELERATION, acceleration)
    }

    /// Arm and start the reference run.
    ///
    /// A run already in progress is aborted first so the start bit sees a
    /// fresh rising edge. Limit switches only record the position while
    /// homing, so the run may use them as reference.
    pub fn start_homing(&self) -> DriveResult<()> {
        let drive = self.drive();
        if self.state()? == HomingState::InProgress {
            debug!("aborting homing in progress");
            drive.update_control_word(|w| w.remove(ControlWord::START))?;
        }
        self.set_limit_switch_reaction(LimitSwitchReaction::RecordPosition)?;
        drive.update_control_word(|w| w.insert(ControlWord::START))?;
        self.power().enable_operation()?;
        info!("homing started");
        Ok(())
    }

    /// Home onto the end switch with method 17.
    pub fn home(&self, speeds: HomingSpeeds) -> DriveResult<()> {
        self.set_homing_speed(speeds)?;
        self.set_homing_mode(DEFAULT_HOMING_METHOD)?;
        self.start_homing()
    }

    /// Decode homing progress from status bits 13, 12 and 10.
    pub fn state(&self) -> DriveResult<HomingState> {
        let status = self.drive().status_word()?.bits();
        HomingState::from_status_word(status).ok_or(DriveError::protocol(
            "homing_state",
            ProtocolError::UnknownHomingState(status),
        ))
    }

    /// Abort the reference run by dropping the start bit.
    pub fn halt(&self) -> DriveResult<()> {
        self.drive()
            .update_control_word(|w| w.remove(ControlWord::START))
            .map(|_| ())
    }

    /// Poll every [`HOMING_POLL_INTERVAL`] until the run completes.
    pub fn wait_until_homed(&self, max_polls: u32) -> DriveResult<()> {
        const OP: &str = "wait_until_homed";

        for _ in 0..max_polls {
            match self.state()? {
                HomingState::Completed => {
                    info!("homing completed");
                    return Ok(());
                }
                state if state.is_error() => {
                    return Err(DriveError::protocol(OP, ProtocolError::HomingFailed(state)));
                }
                _ => self.drive().sleep(HOMING_POLL_INTERVAL),
            }
        }
        Err(DriveError::protocol(OP, ProtocolError::HomingTimeout))
    }
}

impl<'a, R: RegisterAccess> Deref for HomingController<'a, R> {
    type Target = MotionController<'a, R>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<R: RegisterAccess> ModeController for HomingController<'_, R> {
    type State = HomingState;

    fn halt(&self) -> DriveResult<()> {
        HomingController::halt(self)
    }

    fn state(&self) -> DriveResult<HomingState> {
        HomingController::state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBus;

    const SO: u16 = 0x0023;
    const OE: u16 = 0x0027;

    fn homing_bus() -> ScriptedBus {
        let bus = ScriptedBus::new();
        bus.set(od::MODE_OF_OPERATION_DISPLAY, 6);
        bus
    }

    #[test]
    fn constructor_forces_homing_mode() {
        let bus = ScriptedBus::new();
        bus.script_status(&[SO]);
        let power = PowerStateMachine::new(&bus, &());

        let _homing = HomingController::new(&power).unwrap();
        assert_eq!(bus.writes_to(od::MODE_OF_OPERATION), vec![6]);
    }

    #[test]
    fn unordered_speeds_write_nothing() {
        let bus = homing_bus();
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        let err = homing
            .set_homing_speed(HomingSpeeds {
                to_zero: 60,
                to_switch: 50,
            })
            .unwrap_err();

        assert_eq!(
            err.kind(),
            Some(&ProtocolError::InvalidHomingSpeedOrder {
                to_zero: 60,
                to_switch: 50
            })
        );
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn speeds_go_to_their_subindices() {
        let bus = homing_bus();
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.set_homing_speed(HomingSpeeds::default()).unwrap();
        assert_eq!(bus.value(od::HOMING_SPEED_ZERO), 10);
        assert_eq!(bus.value(od::HOMING_SPEED_SWITCH), 50);
    }

    #[test]
    fn state_follows_truth_table() {
        let table = [
            (0x0027, Some(HomingState::InProgress)),
            (0x0427, Some(HomingState::Incomplete)),
            (0x1027, Some(HomingState::Unachieved)),
            (0x1427, Some(HomingState::Completed)),
            (0x2027, Some(HomingState::ErrorStillMoving)),
            (0x2427, Some(HomingState::ErrorHalt)),
            (0x3027, None),
            (0x3427, None),
        ];
        for (status, expected) in table {
            let bus = homing_bus();
            bus.script_status(&[status]);
            let power = PowerStateMachine::new(&bus, &());
            let homing = HomingController::new(&power).unwrap();

            match expected {
                Some(state) => assert_eq!(homing.state().unwrap(), state),
                None => assert_eq!(
                    homing.state().unwrap_err().kind(),
                    Some(&ProtocolError::UnknownHomingState(status))
                ),
            }
        }
    }

    #[test]
    fn start_homing_from_idle() {
        let bus = homing_bus();
        // Incomplete while switched on, then enabled.
        bus.script_status(&[0x0423, 0x0423, OE]);
        bus.set(od::CONTROL_WORD, 0x0007);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.start_homing().unwrap();

        assert_eq!(bus.writes_to(od::LIMIT_SWITCH_ERROR_OPTION), vec![-1]);
        assert_eq!(bus.control_word_writes(), vec![0x0017, 0x001F]);
    }

    #[test]
    fn start_homing_aborts_run_in_progress() {
        let bus = homing_bus();
        bus.script_status(&[OE]);
        bus.set(od::CONTROL_WORD, 0x001F);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.start_homing().unwrap();

        // Start bit dropped, then raised again.
        assert_eq!(bus.control_word_writes(), vec![0x000F, 0x001F]);
    }

    #[test]
    fn home_uses_method_17() {
        let bus = homing_bus();
        bus.script_status(&[OE]);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.home(HomingSpeeds::default()).unwrap();

        assert_eq!(bus.writes_to(od::HOMING_METHOD), vec![17]);
        let method_write = bus
            .writes()
            .into_iter()
            .find(|w| w.address == od::HOMING_METHOD)
            .unwrap();
        assert_eq!(method_write.width, BitWidth::Bits8);
    }

    #[test]
    fn halt_clears_start_bit_only() {
        let bus = homing_bus();
        bus.set(od::CONTROL_WORD, 0x001F);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        ModeController::halt(&homing).unwrap();

        assert_eq!(bus.control_word_writes(), vec![0x000F]);
        assert!(bus.writes_to(od::HALT_OPTION).is_empty());
    }

    #[test]
    fn acceleration_is_a_plain_write() {
        let bus = homing_bus();
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.set_homing_acceleration(5000).unwrap();
        assert_eq!(bus.writes_to(od::HOMING_ACCELERATION), vec![5000]);
    }

    #[test]
    fn wait_until_homed_polls_until_completed() {
        let bus = homing_bus();
        bus.script_status(&[0x0027, 0x0027, 0x1027, 0x1427]);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();

        homing.wait_until_homed(10).unwrap();
        assert_eq!(bus.sleep_count(), 3);
    }

    #[test]
    fn wait_until_homed_reports_errors_and_timeouts() {
        let bus = homing_bus();
        bus.script_status(&[0x0027, 0x2427]);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();
        assert_eq!(
            homing.wait_until_homed(10).unwrap_err().kind(),
            Some(&ProtocolError::HomingFailed(HomingState::ErrorHalt))
        );

        let bus = homing_bus();
        bus.script_status(&[0x0027]);
        let power = PowerStateMachine::new(&bus, &());
        let homing = HomingController::new(&power).unwrap();
        assert_eq!(
            homing.wait_until_homed(5).unwrap_err().kind(),
            Some(&ProtocolError::HomingTimeout)
        );
        assert_eq!(bus.sleep_count(), 5);
    }
}
