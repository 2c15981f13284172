//! Operations valid in every mode of operation.
//!
//! `MotionController` is the shared base of all mode controllers. It only
//! borrows the `PowerStateMachine`, so any number of short-lived
//! controllers can be built over the same drive, one at a time.

use crate::error::{DriveError, DriveResult, ProtocolError};
use crate::handle::DriveRef;
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::motor::{DriveMode, MotorParameters};
use nano402_common::drive::state::{OperationMode, PowerState};
use nano402_common::drive::units::{FeedConstant, GearRatio};
use nano402_common::drive::words::{ControlWord, StatusWord};
use nano402_common::od::{self, BitWidth, OdIndex, SAVE_SIGNATURE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const SAVE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 30 s at [`SAVE_POLL_INTERVAL`].
pub const SAVE_POLL_LIMIT: u32 = 300;

/// Halt option code: slow down on the slow-down ramp.
const HALT_OPTION_SLOW_DOWN_RAMP: i16 = 1;
/// Input special function, range select and inversion for inputs 1 and 2.
const LIMIT_SWITCH_INPUTS: u32 = 0b11;

// ─── Save Groups ────────────────────────────────────────────────────

/// Parameter groups of the store-parameters object (0x1010 subindex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SaveGroup {
    All = 1,
    Communication = 2,
    Application = 3,
    Customer = 4,
    Drive = 5,
    Tuning = 6,
}

impl SaveGroup {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::All),
            2 => Some(Self::Communication),
            3 => Some(Self::Application),
            4 => Some(Self::Customer),
            5 => Some(Self::Drive),
            6 => Some(Self::Tuning),
            _ => None,
        }
    }

    #[inline]
    pub const fn address(self) -> OdIndex {
        OdIndex::new(od::STORE_PARAMETERS, self as u8)
    }
}

// ─── Limit Switch Reaction ──────────────────────────────────────────

/// Reaction to a tripped limit switch (0x3701).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum LimitSwitchReaction {
    /// No reaction; the position is only recorded. Used for reference runs.
    RecordPosition = -1,
    /// Quick-stop ramp, then switch on disabled.
    QuickStopThenDisable = 2,
}

// ─── Reports ────────────────────────────────────────────────────────

/// Decoded status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status_word: u16,
    pub power_state: PowerState,
    pub fault: bool,
    pub voltage_enabled: bool,
    pub quick_stop_active: bool,
    pub warning: bool,
    pub remote: bool,
    pub target_reached: bool,
    pub internal_limit: bool,
    pub op_specific_12: bool,
    pub op_specific_13: bool,
}

/// One entry of the device's error history (0x1003).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFault {
    /// CiA 301 emergency error code.
    pub code: u16,
    /// Error register bits at the time of the fault.
    pub class: u8,
    /// Manufacturer error number.
    pub number: u8,
}

impl DeviceFault {
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            code: raw as u16,
            class: (raw >> 16) as u8,
            number: (raw >> 24) as u8,
        }
    }

    pub const fn to_raw(self) -> u32 {
        self.code as u32 | (self.class as u32) << 16 | (self.number as u32) << 24
    }
}

// ─── MotionController ───────────────────────────────────────────────

pub struct MotionController<'a, R: RegisterAccess> {
    power: &'a PowerStateMachine<'a, R>,
}

impl<'a, R: RegisterAccess> MotionController<'a, R> {
    pub const fn new(power: &'a PowerStateMachine<'a, R>) -> Self {
        Self { power }
    }

    #[inline]
    pub const fn power(&self) -> &'a PowerStateMachine<'a, R> {
        self.power
    }

    #[inline]
    pub const fn drive(&self) -> DriveRef<'a, R> {
        self.power.drive()
    }

    // ─── Mode of Operation ──────────────────────────────────────────

    /// Switch mode. Disables operation first unless already in `mode`.
    ///
    /// Compares the raw display code, so a drive left in a mode this crate
    /// does not name can still be switched.
    pub fn set_mode_of_operation(&self, mode: OperationMode) -> DriveResult<()> {
        if self.mode_code()? == mode.as_i8() {
            return Ok(());
        }
        self.power.disable_operation()?;
        self.drive().write(
            od::MODE_OF_OPERATION,
            i64::from(mode.as_i8()),
            BitWidth::Bits8,
        )?;
        debug!(%mode, "mode of operation");
        Ok(())
    }

    /// Raw mode display code (0x6061), including unassigned codes.
    pub fn mode_code(&self) -> DriveResult<i8> {
        Ok(self.drive().read(od::MODE_OF_OPERATION_DISPLAY)? as i8)
    }

    /// Active mode, as displayed by the drive (0x6061).
    pub fn get_mode_of_operation(&self) -> DriveResult<OperationMode> {
        let raw = self.mode_code()?;
        OperationMode::from_i8(raw).ok_or(DriveError::protocol(
            "get_mode_of_operation",
            ProtocolError::UnknownOperationMode(raw),
        ))
    }

    // ─── Motor ──────────────────────────────────────────────────────

    pub fn set_motor_parameters(&self, motor: &MotorParameters) -> DriveResult<()> {
        self.power.disable_operation()?;

        let drive = self.drive();
        drive.write_u32(od::POLE_PAIR_COUNT, motor.pole_pair_count)?;
        drive.write_u32(od::RATED_CURRENT, motor.rated_current_ma)?;
        drive.write_u32(od::MAX_MOTOR_CURRENT, motor.max_current_ma)?;
        drive.write_u32(od::MAX_CURRENT_DURATION, motor.max_current_duration_ms)?;
        drive.write_u32(od::IDLE_CURRENT, motor.idle_current_ma)?;
        drive.update_u32(od::MOTOR_DRIVE_SUBMODE, |raw| motor.drive_mode.apply_to(raw))?;

        info!(drive_mode = ?motor.drive_mode, "motor parameters set");
        Ok(())
    }

    pub fn get_motor_parameters(&self) -> DriveResult<MotorParameters> {
        let drive = self.drive();
        Ok(MotorParameters {
            pole_pair_count: drive.read_u32(od::POLE_PAIR_COUNT)?,
            rated_current_ma: drive.read_u32(od::RATED_CURRENT)?,
            max_current_ma: drive.read_u32(od::MAX_MOTOR_CURRENT)?,
            max_current_duration_ms: drive.read_u32(od::MAX_CURRENT_DURATION)?,
            idle_current_ma: drive.read_u32(od::IDLE_CURRENT)?,
            drive_mode: DriveMode::from_submode(drive.read_u32(od::MOTOR_DRIVE_SUBMODE)?),
        })
    }

    pub fn set_max_motor_speed(&self, speed: u32) -> DriveResult<()> {
        self.drive().write_u32(od::MAX_MOTOR_SPEED, speed)
    }

    // ─── Parameter Storage ──────────────────────────────────────────

    /// Store one parameter group in non-volatile memory.
    ///
    /// Writes the signature, then reads the same subindex back every
    /// [`SAVE_POLL_INTERVAL`] until it reads 1. Gives up after
    /// [`SAVE_POLL_LIMIT`] reads.
    pub fn save(&self, group: SaveGroup) -> DriveResult<()> {
        self.power.disable_operation()?;

        let drive = self.drive();
        let address = group.address();
        drive.write_u32(address, SAVE_SIGNATURE)?;

        for _ in 0..SAVE_POLL_LIMIT {
            if drive.read(address)? == 1 {
                info!(?group, "parameters saved");
                return Ok(());
            }
            drive.sleep(SAVE_POLL_INTERVAL);
        }
        Err(DriveError::protocol("save", ProtocolError::SaveTimeout { group }))
    }

    /// Store motor tuning and drive parameters.
    pub fn save_motor_parameters(&self) -> DriveResult<()> {
        self.save(SaveGroup::Tuning)?;
        self.save(SaveGroup::Drive)
    }

    /// Store feed, gear and unit descriptors.
    pub fn save_user_units(&self) -> DriveResult<()> {
        self.save(SaveGroup::Application)
    }

    // ─── User Units ─────────────────────────────────────────────────

    pub fn set_user_units_feed(&self, feed: u32, shaft_revolutions: u32) -> DriveResult<()> {
        self.power.disable_operation()?;
        let drive = self.drive();
        drive.write_u32(OdIndex::new(od::FEED_CONSTANT, 1), feed)?;
        drive.write_u32(OdIndex::new(od::FEED_CONSTANT, 2), shaft_revolutions)
    }

    pub fn get_user_units_feed(&self) -> DriveResult<FeedConstant> {
        let drive = self.drive();
        Ok(FeedConstant {
            feed: drive.read_u32(OdIndex::new(od::FEED_CONSTANT, 1))?,
            shaft_revolutions: drive.read_u32(OdIndex::new(od::FEED_CONSTANT, 2))?,
        })
    }

    pub fn set_user_units_gear_ratio(
        &self,
        motor_revolutions: u32,
        shaft_revolutions: u32,
    ) -> DriveResult<()> {
        self.power.disable_operation()?;
        let drive = self.drive();
        drive.write_u32(OdIndex::new(od::GEAR_RATIO, 1), motor_revolutions)?;
        drive.write_u32(OdIndex::new(od::GEAR_RATIO, 2), shaft_revolutions)
    }

    pub fn get_user_units_gear_ratio(&self) -> DriveResult<GearRatio> {
        let drive = self.drive();
        Ok(GearRatio {
            motor_revolutions: drive.read_u32(OdIndex::new(od::GEAR_RATIO, 1))?,
            shaft_revolutions: drive.read_u32(OdIndex::new(od::GEAR_RATIO, 2))?,
        })
    }

    // ─── Actual Values ──────────────────────────────────────────────

    /// Position actual value (0x6064), user units.
    pub fn get_position_actual(&self) -> DriveResult<i32> {
        self.drive().read_i32(od::POSITION_ACTUAL)
    }

    /// Velocity actual value (0x606C), user units.
    pub fn get_speed_actual(&self) -> DriveResult<i32> {
        self.drive().read_i32(od::VELOCITY_ACTUAL)
    }

    /// vl velocity actual value (0x6044).
    pub fn get_velocity_actual(&self) -> DriveResult<i16> {
        self.drive().read_i16(od::VL_VELOCITY_ACTUAL)
    }

    /// vl velocity demand (0x6043).
    pub fn get_velocity_demanded(&self) -> DriveResult<i16> {
        self.drive().read_i16(od::VL_VELOCITY_DEMAND)
    }

    // ─── Halt ───────────────────────────────────────────────────────

    /// Stop on the slow-down ramp. Only in modes that support halt.
    pub fn halt(&self) -> DriveResult<()> {
        let mode = self.get_mode_of_operation()?;
        if !mode.supports_halt() {
            return Err(DriveError::protocol(
                "halt",
                ProtocolError::InvalidHaltMode(mode),
            ));
        }
        let drive = self.drive();
        drive.write_i16(od::HALT_OPTION, HALT_OPTION_SLOW_DOWN_RAMP)?;
        drive.update_control_word(|w| w.insert(ControlWord::HALT))?;
        debug!(%mode, "halt");
        Ok(())
    }

    // ─── Inputs ─────────────────────────────────────────────────────

    pub(crate) fn set_limit_switch_reaction(&self, reaction: LimitSwitchReaction) -> DriveResult<()> {
        self.drive()
            .write_i16(od::LIMIT_SWITCH_ERROR_OPTION, reaction as i16)
    }

    /// Route digital inputs 1 and 2 to the negative and positive limit
    /// switches, 24 V range, normally closed.
    pub fn configure_limit_switch_inputs(&self) -> DriveResult<()> {
        let drive = self.drive();
        for address in [
            od::INPUT_SPECIAL_FUNCTION,
            od::INPUT_RANGE_SELECT,
            od::INPUT_FUNCTION_INVERTED,
        ] {
            drive.update_u32(address, |raw| raw | LIMIT_SWITCH_INPUTS)?;
        }
        Ok(())
    }

    /// Physical digital inputs (bits 16–23 of 0x60FD).
    pub fn read_digital_inputs(&self) -> DriveResult<u8> {
        Ok((self.drive().read_u32(od::DIGITAL_INPUTS)? >> 16) as u8)
    }

    // ─── Diagnostics ────────────────────────────────────────────────

    pub fn status_report(&self) -> DriveResult<StatusReport> {
        let status = self.drive().status_word()?;
        let power_state = PowerState::from_status_word(status.bits()).ok_or(
            DriveError::protocol("status_report", ProtocolError::UnknownState(status.bits())),
        )?;
        Ok(StatusReport {
            status_word: status.bits(),
            power_state,
            fault: status.contains(StatusWord::FAULT),
            voltage_enabled: status.contains(StatusWord::VOLTAGE_ENABLED),
            quick_stop_active: !status.contains(StatusWord::QUICK_STOP),
            warning: status.contains(StatusWord::WARNING),
            remote: status.contains(StatusWord::REMOTE),
            target_reached: status.contains(StatusWord::TARGET_REACHED),
            internal_limit: status.contains(StatusWord::INTERNAL_LIMIT),
            op_specific_12: status.contains(StatusWord::OP_SPECIFIC_12),
            op_specific_13: status.contains(StatusWord::OP_SPECIFIC_13),
        })
    }

    /// Recorded faults, most recent first. Subindex 0 (the count) is skipped.
    pub fn error_history(&self) -> DriveResult<Vec<DeviceFault>> {
        let entries = self.drive().read_array(od::ERROR_HISTORY)?;
        Ok(entries
            .into_iter()
            .skip(1)
            .map(|raw| DeviceFault::from_raw(raw as u32))
            .collect())
    }

    pub fn device_name(&self) -> DriveResult<String> {
        self.drive().read_string(od::DEVICE_NAME)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
