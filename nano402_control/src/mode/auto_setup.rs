//! Auto setup mode: the drive identifies the connected motor.

use crate::error::{DriveError, DriveResult, ProtocolError};
use crate::mode::ModeController;
use crate::motion::MotionController;
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::state::{OperationMode, PowerState};
use nano402_common::drive::words::{ControlWord, StatusWord};
use std::ops::Deref;
use std::time::Duration;
use tracing::info;

pub const AUTO_SETUP_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// 30 s at [`AUTO_SETUP_POLL_INTERVAL`].
pub const AUTO_SETUP_POLL_LIMIT: u32 = 3000;

/// Status bits that must all be set after shutdown before auto setup.
const AUTO_SETUP_READY: StatusWord = StatusWord::READY_TO_SWITCH_ON
    .union(StatusWord::QUICK_STOP)
    .union(StatusWord::REMOTE);

pub struct AutoSetupController<'a, R: RegisterAccess> {
    base: MotionController<'a, R>,
}

impl<'a, R: RegisterAccess> AutoSetupController<'a, R> {
    /// Switches the drive to auto setup mode.
    pub fn new(power: &'a PowerStateMachine<'a, R>) -> DriveResult<Self> {
        let base = MotionController::new(power);
        base.set_mode_of_operation(OperationMode::AutoSetup)?;
        Ok(Self { base })
    }

    /// Run motor identification.
    ///
    /// Shuts the drive down, checks it is remote controlled, ready to switch
    /// on and not quick stopping, enables operation and raises the start
    /// bit. Completion is status bit 12, polled every
    /// [`AUTO_SETUP_POLL_INTERVAL`] for at most [`AUTO_SETUP_POLL_LIMIT`]
    /// reads. The control word is cleared afterwards.
    pub fn auto_setup_motor_parameters(&self) -> DriveResult<()> {
        const OP: &str = "auto_setup_motor_parameters";

        let drive = self.drive();
        self.power().shutdown()?;
        let status = drive.status_word()?;
        if !status.contains(AUTO_SETUP_READY) {
            return Err(DriveError::protocol(
                OP,
                ProtocolError::PreconditionFailed {
                    status: status.bits(),
                },
            ));
        }

        self.power().enable_operation()?;
        drive.update_control_word(|w| w.insert(ControlWord::START))?;

        for _ in 0..AUTO_SETUP_POLL_LIMIT {
            if drive.status_word()?.contains(StatusWord::OP_SPECIFIC_12) {
                drive.write_control_word(ControlWord::empty())?;
                info!("auto setup completed");
                return Ok(());
            }
            drive.sleep(AUTO_SETUP_POLL_INTERVAL);
        }
        Err(DriveError::protocol(OP, ProtocolError::AutoSetupTimeout))
    }
}

impl<'a, R: RegisterAccess> Deref for AutoSetupController<'a, R> {
    type Target = MotionController<'a, R>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<R: RegisterAccess> ModeController for AutoSetupController<'_, R> {
    type State = PowerState;

    /// Auto setup cannot be halted; this always reports `InvalidHaltMode`.
    fn halt(&self) -> DriveResult<()> {
        self.base.halt()
    }

    fn state(&self) -> DriveResult<PowerState> {
        self.power().current_state()
    }
}
