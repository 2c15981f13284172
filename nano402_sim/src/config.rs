//! Simulation settings.
//!
//! # TOML Example
//!
//! ```toml
//! node_id = 1
//! device_name = "PD4-C (simulated)"
//! homing_time_ms = 1500
//! save_time_ms = 200
//! ```

use nano402_common::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity and timing of a simulated drive. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Node the drive answers on (1..=127).
    pub node_id: u8,
    /// Manufacturer device name (0x1008).
    pub device_name: String,
    /// Report remote control (status bit 9).
    pub remote: bool,
    /// Time from power on to switch on disabled.
    pub boot_time_ms: u64,
    /// Time spent in fault reaction active before entering fault.
    pub fault_reaction_time_ms: u64,
    /// Duration of a reference run.
    pub homing_time_ms: u64,
    /// Position actual value after a completed reference run.
    pub home_offset: i32,
    /// Duration of motor identification.
    pub auto_setup_time_ms: u64,
    /// Duration of one parameter save.
    pub save_time_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            device_name: "nano402 simulated drive".to_string(),
            remote: true,
            boot_time_ms: 50,
            fault_reaction_time_ms: 10,
            homing_time_ms: 1500,
            home_offset: 0,
            auto_setup_time_ms: 2000,
            save_time_ms: 200,
        }
    }
}

impl SimulationConfig {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a node id outside
    /// 1..=127 or an empty device name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=127).contains(&self.node_id) {
            return Err(ConfigError::ValidationError(format!(
                "node_id {} outside 1..=127",
                self.node_id
            )));
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "device_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub const fn boot_time(&self) -> Duration {
        Duration::from_millis(self.boot_time_ms)
    }

    #[inline]
    pub const fn fault_reaction_time(&self) -> Duration {
        Duration::from_millis(self.fault_reaction_time_ms)
    }

    #[inline]
    pub const fn homing_time(&self) -> Duration {
        Duration::from_millis(self.homing_time_ms)
    }

    #[inline]
    pub const fn auto_setup_time(&self) -> Duration {
        Duration::from_millis(self.auto_setup_time_ms)
    }

    #[inline]
    pub const fn save_time(&self) -> Duration {
        Duration::from_millis(self.save_time_ms)
    }
}
