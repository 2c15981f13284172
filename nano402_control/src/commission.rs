//! Apply a commissioning profile to a drive.
//!
//! Sections are applied in a fixed order: motor, user units, homing,
//! positioning, velocity. Absent sections are skipped. Mode-specific
//! settings switch the drive into the owning mode first, so the drive may
//! end up in a different mode than it started in.

use crate::error::{DriveError, DriveResult};
use crate::mode::homing::HomingController;
use crate::mode::position::ProfilePositionController;
use crate::mode::velocity::VelocityController;
use crate::motion::{MotionController, SaveGroup};
use crate::power::PowerStateMachine;
use nano402_common::bus::RegisterAccess;
use nano402_common::config::ConfigError;
use nano402_common::drive::profile::DriveProfile;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// What `apply_profile` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommissionReport {
    /// Profile sections written, in order.
    pub sections: Vec<&'static str>,
    /// Parameter groups stored, in order.
    pub saved: Vec<SaveGroup>,
}

/// Error from commissioning: the profile was invalid or a drive operation failed.
#[derive(Debug, Error)]
pub enum CommissionError {
    #[error("Invalid profile: {0}")]
    Profile(#[from] ConfigError),

    #[error(transparent)]
    Drive(#[from] DriveError),
}

/// Validate `profile`, write it to the drive and optionally store it.
pub fn apply_profile<R: RegisterAccess>(
    power: &PowerStateMachine<'_, R>,
    profile: &DriveProfile,
    save: bool,
) -> Result<CommissionReport, CommissionError> {
    profile.validate()?;
    let mut report = CommissionReport::default();
    write_sections(power, profile, &mut report)?;
    if save {
        store_sections(power, &mut report)?;
    }
    info!(
        drive = %profile.shared.service_name,
        sections = report.sections.len(),
        saved = report.saved.len(),
        "profile applied"
    );
    Ok(report)
}

fn write_sections<R: RegisterAccess>(
    power: &PowerStateMachine<'_, R>,
    profile: &DriveProfile,
    report: &mut CommissionReport,
) -> DriveResult<()> {
    let base = MotionController::new(power);

    if let Some(motor) = &profile.motor {
        base.set_motor_parameters(motor)?;
        report.sections.push("motor");
    }

    if let Some(units) = &profile.units {
        if let Some(feed) = units.feed {
            base.set_user_units_feed(feed.feed, feed.shaft_revolutions)?;
        }
        if let Some(gear) = units.gear {
            base.set_user_units_gear_ratio(gear.motor_revolutions, gear.shaft_revolutions)?;
        }
        if let Some(position) = units.position {
            ProfilePositionController::new(power)?
                .set_user_units_positioning(position.unit, position.exponent)?;
        }
        if let Some(velocity) = units.velocity {
            VelocityController::new(power)?.set_user_units_velocity(
                velocity.unit,
                velocity.exponent,
                velocity.time_base,
            )?;
        }
        report.sections.push("units");
    }

    if let Some(homing) = &profile.homing {
        let controller = HomingController::new(power)?;
        controller.set_homing_speed(homing.speeds())?;
        controller.set_homing_mode(homing.method)?;
        if let Some(acceleration) = homing.acceleration {
            controller.set_homing_acceleration(acceleration)?;
        }
        report.sections.push("homing");
    }

    if let Some(positioning) = &profile.positioning {
        let controller = ProfilePositionController::new(power)?;
        if let Some(velocity) = positioning.profile_velocity {
            controller.set_profile_velocity(velocity)?;
        }
        if let Some(acceleration) = positioning.profile_acceleration {
            controller.set_profile_acceleration(acceleration)?;
        }
        if let Some(speed) = positioning.max_motor_speed {
            controller.set_max_motor_speed(speed)?;
        }
        report.sections.push("positioning");
    }

    if let Some(velocity) = &profile.velocity {
        let controller = VelocityController::new(power)?;
        if let Some(ramp) = velocity.acceleration {
            controller.set_velocity_acceleration(ramp)?;
        }
        if let Some(ramp) = velocity.deceleration {
            controller.set_velocity_deceleration(ramp)?;
        }
        report.sections.push("velocity");
    }

    debug!(sections = ?report.sections, "profile written");
    Ok(())
}

fn store_sections<R: RegisterAccess>(
    power: &PowerStateMachine<'_, R>,
    report: &mut CommissionReport,
) -> DriveResult<()> {
    let base = MotionController::new(power);

    if report.sections.contains(&"motor") {
        base.save_motor_parameters()?;
        report.saved.extend([SaveGroup::Tuning, SaveGroup::Drive]);
    }
    if report.sections.iter().any(|s| *s != "motor") {
        base.save(SaveGroup::Application)?;
        report.saved.push(SaveGroup::Application);
    }
    Ok(())
}
