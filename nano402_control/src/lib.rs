//! # nano402 Control Library
//!
//! Drives a CiA 402 motor controller through its control and status words.
//! Everything here is synchronous: one register access at a time, polling
//! with fixed intervals and iteration bounds where the drive needs time.
//!
//! ## Layers
//!
//! 1. **[`PowerStateMachine`]** - Decodes the status word into a
//!    [`PowerState`](nano402_common::drive::state::PowerState) and walks the
//!    power graph (enable, disable, shutdown, quick stop)
//! 2. **[`MotionController`]** - Operations valid in every mode: mode
//!    switching, motor parameters, parameter save, user units, halt
//! 3. **Mode controllers** - [`HomingController`], [`ProfilePositionController`],
//!    [`VelocityController`], [`AutoSetupController`]; each forces its mode
//!    on construction and implements [`ModeController`]
//! 4. **[`commission`]** - Applies a whole `DriveProfile`
//!
//! ## Ownership
//!
//! Nothing is cached. Controllers borrow the register bus, the device handle
//! and one `PowerStateMachine`; the drive itself is the only state.
//!
//! ```rust,ignore
//! let power = PowerStateMachine::new(&bus, &device);
//! let homing = HomingController::new(&power)?;
//! homing.home(HomingSpeeds::default())?;
//! homing.wait_until_homed(300)?;
//! ```

pub mod commission;
pub mod error;
pub mod handle;
pub mod mode;
pub mod motion;
pub mod power;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DriveError, DriveResult, ProtocolError};
pub use handle::DriveRef;
pub use mode::auto_setup::AutoSetupController;
pub use mode::homing::HomingController;
pub use mode::position::ProfilePositionController;
pub use mode::velocity::VelocityController;
pub use mode::ModeController;
pub use motion::{DeviceFault, MotionController, SaveGroup, StatusReport};
pub use power::PowerStateMachine;
