//! Mode controllers.
//!
//! Each controller wraps a [`MotionController`](crate::motion::MotionController),
//! forces its mode of operation on construction and dereferences to the
//! base for the mode-independent operations.

pub mod auto_setup;
pub mod homing;
pub mod position;
pub mod velocity;

use crate::error::DriveResult;

/// Capabilities that differ per mode of operation.
pub trait ModeController {
    /// What `state` reports: homing progress or the power state.
    type State;

    /// Stop the current motion the way this mode requires.
    fn halt(&self) -> DriveResult<()>;

    fn state(&self) -> DriveResult<Self::State>;
}
