//! Velocity (vl) mode.

use crate::error::DriveResult;
use crate::mode::ModeController;
use crate::motion::{LimitSwitchReaction, MotionController};
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::profile::VelocityRamp;
use nano402_common::drive::state::{OperationMode, PowerState};
use nano402_common::drive::units::VelocityUnits;
use nano402_common::drive::words::ControlWord;
use nano402_common::od::{self, BitWidth, OdIndex};
use std::ops::Deref;
use tracing::info;

pub struct VelocityController<'a, R: RegisterAccess> {
    base: MotionController<'a, R>,
}

impl<'a, R: RegisterAccess> VelocityController<'a, R> {
    /// Switches the drive to velocity mode.
    pub fn new(power: &'a PowerStateMachine<'a, R>) -> DriveResult<Self> {
        let base = MotionController::new(power);
        base.set_mode_of_operation(OperationMode::Velocity)?;
        Ok(Self { base })
    }

    pub fn set_target_velocity(&self, velocity: i16) -> DriveResult<()> {
        self.drive().write_i16(od::VL_TARGET_VELOCITY, velocity)
    }

    pub fn target_velocity(&self) -> DriveResult<i16> {
        self.drive().read_i16(od::VL_TARGET_VELOCITY)
    }

    pub fn set_velocity_acceleration(&self, ramp: VelocityRamp) -> DriveResult<()> {
        self.write_ramp(od::VL_ACCELERATION, ramp)
    }

    pub fn velocity_acceleration(&self) -> DriveResult<VelocityRamp> {
        self.read_ramp(od::VL_ACCELERATION)
    }

    pub fn set_velocity_deceleration(&self, ramp: VelocityRamp) -> DriveResult<()> {
        self.write_ramp(od::VL_DECELERATION, ramp)
    }

    pub fn velocity_deceleration(&self) -> DriveResult<VelocityRamp> {
        self.read_ramp(od::VL_DECELERATION)
    }

    // Delta speed is UNSIGNED32, delta time UNSIGNED16.
    fn write_ramp(&self, index: u16, ramp: VelocityRamp) -> DriveResult<()> {
        let drive = self.drive();
        drive.write_u32(OdIndex::new(index, 1), ramp.delta_speed)?;
        drive.write(
            OdIndex::new(index, 2),
            i64::from(ramp.delta_time),
            BitWidth::Bits16,
        )
    }

    fn read_ramp(&self, index: u16) -> DriveResult<VelocityRamp> {
        let drive = self.drive();
        Ok(VelocityRamp {
            delta_speed: drive.read_u32(OdIndex::new(index, 1))?,
            delta_time: drive.read(OdIndex::new(index, 2))? as u16,
        })
    }

    /// Stop at limit switches, release halt and enable operation.
    pub fn start_velocity(&self) -> DriveResult<()> {
        self.set_limit_switch_reaction(LimitSwitchReaction::QuickStopThenDisable)?;
        self.drive()
            .update_control_word(|w| w.remove(ControlWord::HALT))?;
        self.power().enable_operation()?;
        info!("velocity mode started");
        Ok(())
    }

    /// Rewrite unit, exponent and time base of 0x60A9, keeping bits 0–7.
    pub fn set_user_units_velocity(&self, unit: u8, exponent: u8, time_base: u8) -> DriveResult<()> {
        self.power().disable_operation()?;
        let units = VelocityUnits::new(unit, exponent, time_base);
        self.drive()
            .update_u32(od::SI_UNIT_VELOCITY, |raw| units.pack_into(raw))?;
        info!(%units, "velocity units set");
        Ok(())
    }

    pub fn get_user_units_velocity(&self) -> DriveResult<VelocityUnits> {
        Ok(VelocityUnits::from_register(
            self.drive().read_u32(od::SI_UNIT_VELOCITY)?,
        ))
    }
}

impl<'a, R: RegisterAccess> Deref for VelocityController<'a, R> {
    type Target = MotionController<'a, R>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<R: RegisterAccess> ModeController for VelocityController<'_, R> {
    type State = PowerState;

    fn halt(&self) -> DriveResult<()> {
        self.base.halt()
    }

    fn state(&self) -> DriveResult<PowerState> {
        self.power().current_state()
    }
}
