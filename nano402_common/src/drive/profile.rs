//! Drive commissioning profile.
//!
//! One TOML file describes everything written to a drive before it is put
//! to work. Every section except `[shared]` is optional; an absent section
//! leaves the drive's current values alone.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "axis-x"
//!
//! [motor]
//! pole_pair_count = 50
//! rated_current_ma = 2820
//! max_current_ma = 1000
//! max_current_duration_ms = 100
//! idle_current_ma = 500
//! drive_mode = "stepper_closed_loop"
//!
//! [units]
//! feed = { feed = 3600, shaft_revolutions = 1 }
//! position = { unit = 0x41, exponent = -1 }
//!
//! [homing]
//! speed_to_zero = 10
//! speed_to_switch = 50
//!
//! [positioning]
//! profile_velocity = 200
//! profile_acceleration = 500
//!
//! [velocity]
//! acceleration = { delta_speed = 100, delta_time = 1 }
//! ```

use crate::config::{ConfigError, SharedConfig};
use crate::drive::homing::HomingConfig;
use crate::drive::motor::MotorParameters;
use crate::drive::units::{
    FeedConstant, GearRatio, PositionUnits, VelocityUnits, exponent_from_code,
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Accepted profile acceleration (0x6083).
pub const PROFILE_ACCELERATION_RANGE: RangeInclusive<u32> = 1..=10_000;
/// Accepted homing acceleration (0x609A).
pub const HOMING_ACCELERATION_RANGE: RangeInclusive<u32> = 1..=1_000;
/// Accepted maximum motor current [mA].
pub const MAX_CURRENT_RANGE: RangeInclusive<u32> = 1..=2_500;

/// Complete commissioning profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveProfile {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub motor: Option<MotorParameters>,
    #[serde(default)]
    pub units: Option<UnitsConfig>,
    #[serde(default)]
    pub homing: Option<HomingConfig>,
    #[serde(default)]
    pub positioning: Option<PositioningConfig>,
    #[serde(default)]
    pub velocity: Option<VelocityConfig>,
}

/// User-unit scaling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitsConfig {
    #[serde(default)]
    pub feed: Option<FeedConstant>,
    #[serde(default)]
    pub gear: Option<GearRatio>,
    #[serde(default)]
    pub position: Option<PositionUnits>,
    #[serde(default)]
    pub velocity: Option<VelocityUnits>,
}

/// Profile-position parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositioningConfig {
    #[serde(default)]
    pub profile_velocity: Option<u32>,
    #[serde(default)]
    pub profile_acceleration: Option<u32>,
    #[serde(default)]
    pub max_motor_speed: Option<u32>,
}

/// One vl ramp: `delta_speed` per `delta_time` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityRamp {
    pub delta_speed: u32,
    pub delta_time: u16,
}

/// Velocity-mode ramps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VelocityConfig {
    #[serde(default)]
    pub acceleration: Option<VelocityRamp>,
    #[serde(default)]
    pub deceleration: Option<VelocityRamp>,
}

fn check_range(name: &str, value: u32, range: &RangeInclusive<u32>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{name} = {value} outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

fn check_exponent(name: &str, code: u8) -> Result<(), ConfigError> {
    exponent_from_code(code).map(|_| ()).ok_or_else(|| {
        ConfigError::ValidationError(format!("{name} exponent {} outside -6..=6", code as i8))
    })
}

impl DriveProfile {
    /// Validate the profile before any register is touched.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if let Some(motor) = &self.motor {
            check_range("motor.max_current_ma", motor.max_current_ma, &MAX_CURRENT_RANGE)?;
        }

        if let Some(units) = &self.units {
            if let Some(feed) = &units.feed {
                if feed.shaft_revolutions == 0 {
                    return Err(ConfigError::ValidationError(
                        "units.feed.shaft_revolutions cannot be zero".to_string(),
                    ));
                }
            }
            if let Some(gear) = &units.gear {
                if gear.shaft_revolutions == 0 {
                    return Err(ConfigError::ValidationError(
                        "units.gear.shaft_revolutions cannot be zero".to_string(),
                    ));
                }
            }
            if let Some(position) = &units.position {
                check_exponent("units.position", position.exponent)?;
            }
            if let Some(velocity) = &units.velocity {
                check_exponent("units.velocity", velocity.exponent)?;
            }
        }

        if let Some(homing) = &self.homing {
            if !homing.speeds().is_ordered() {
                return Err(ConfigError::ValidationError(format!(
                    "homing.speed_to_zero ({}) must be below homing.speed_to_switch ({})",
                    homing.speed_to_zero, homing.speed_to_switch
                )));
            }
            if let Some(acceleration) = homing.acceleration {
                check_range("homing.acceleration", acceleration, &HOMING_ACCELERATION_RANGE)?;
            }
        }

        if let Some(acceleration) = self
            .positioning
            .as_ref()
            .and_then(|p| p.profile_acceleration)
        {
            check_range(
                "positioning.profile_acceleration",
                acceleration,
                &PROFILE_ACCELERATION_RANGE,
            )?;
        }

        Ok(())
    }
}
