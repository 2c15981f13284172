//! Profile position mode.

use crate::error::DriveResult;
use crate::mode::ModeController;
use crate::motion::{LimitSwitchReaction, MotionController};
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::state::{OperationMode, PowerState};
use nano402_common::drive::units::PositionUnits;
use nano402_common::drive::words::ControlWord;
use nano402_common::od;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use tracing::info;

/// Current set-point parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositioningParameters {
    pub profile_velocity: u32,
    pub target_position: i32,
}

pub struct ProfilePositionController<'a, R: RegisterAccess> {
    base: MotionController<'a, R>,
}

impl<'a, R: RegisterAccess> ProfilePositionController<'a, R> {
    /// Switches the drive to profile position mode.
    pub fn new(power: &'a PowerStateMachine<'a, R>) -> DriveResult<Self> {
        let base = MotionController::new(power);
        base.set_mode_of_operation(OperationMode::ProfilePosition)?;
        Ok(Self { base })
    }

    /// Load a new target. Takes effect on the next `start_positioning`.
    ///
    /// Positioning stops at a limit switch (quick-stop ramp, then switch
    /// on disabled).
    pub fn set_target_position(&self, target: i32, relative: bool) -> DriveResult<()> {
        let drive = self.drive();
        drive.update_control_word(|w| {
            w.set(ControlWord::RELATIVE, relative);
            w.remove(ControlWord::START);
        })?;
        self.set_limit_switch_reaction(LimitSwitchReaction::QuickStopThenDisable)?;
        drive.write_i32(od::TARGET_POSITION, target)
    }

    pub fn set_profile_velocity(&self, velocity: u32) -> DriveResult<()> {
        self.drive().write_u32(od::PROFILE_VELOCITY, velocity)
    }

    pub fn set_profile_acceleration(&self, acceleration: u32) -> DriveResult<()> {
        self.drive().write_u32(od::PROFILE_ACCELERATION, acceleration)
    }

    /// Raise the set-point strobe (immediate change) and enable operation.
    pub fn start_positioning(&self) -> DriveResult<()> {
        self.drive().update_control_word(|w| {
            w.insert(ControlWord::CHANGE_IMMEDIATELY);
            w.remove(ControlWord::HALT);
            w.insert(ControlWord::START);
        })?;
        self.power().enable_operation()?;
        info!("positioning started");
        Ok(())
    }

    pub fn positioning_parameters(&self) -> DriveResult<PositioningParameters> {
        let drive = self.drive();
        Ok(PositioningParameters {
            profile_velocity: drive.read_u32(od::PROFILE_VELOCITY)?,
            target_position: drive.read_i32(od::TARGET_POSITION)?,
        })
    }

    /// Rewrite unit and exponent of 0x60A8, keeping bits 0–15.
    pub fn set_user_units_positioning(&self, unit: u8, exponent: u8) -> DriveResult<()> {
        self.power().disable_operation()?;
        let units = PositionUnits::new(unit, exponent);
        self.drive()
            .update_u32(od::SI_UNIT_POSITION, |raw| units.pack_into(raw))?;
        info!(%units, "position units set");
        Ok(())
    }

    pub fn get_user_units_positioning(&self) -> DriveResult<PositionUnits> {
        Ok(PositionUnits::from_register(
            self.drive().read_u32(od::SI_UNIT_POSITION)?,
        ))
    }

    /// Stop by raising the halt bit only.
    pub fn halt(&self) -> DriveResult<()> {
        self.drive()
            .update_control_word(|w| w.insert(ControlWord::HALT))
            .map(|_| ())
    }
}

impl<'a, R: RegisterAccess> Deref for ProfilePositionController<'a, R> {
    type Target = MotionController<'a, R>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<R: RegisterAccess> ModeController for ProfilePositionController<'_, R> {
    type State = PowerState;

    fn halt(&self) -> DriveResult<()> {
        ProfilePositionController::halt(self)
    }

    fn state(&self) -> DriveResult<PowerState> {
        self.power().current_state()
    }
}
