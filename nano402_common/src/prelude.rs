//! Prelude module for common re-exports.
//!
//! ```rust
//! use nano402_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Register Access ────────────────────────────────────────────────
pub use crate::bus::{RegisterAccess, RegisterError};
pub use crate::od::{BitWidth, OdIndex};

// ─── Drive Types ────────────────────────────────────────────────────
pub use crate::drive::motor::{DriveMode, MotorParameters};
pub use crate::drive::profile::{DriveProfile, VelocityRamp};
pub use crate::drive::homing::{HomingSpeeds, HomingState};
pub use crate::drive::state::{OperationMode, PowerState};
pub use crate::drive::units::{FeedConstant, GearRatio, PositionUnits, VelocityUnits};
pub use crate::drive::words::{ControlWord, StatusWord};
