//! Error families for drive operations.
//!
//! - `RegisterError` (from `nano402_common::bus`) - I/O: the bus failed or
//!   the device refused. Propagated unchanged, never retried here.
//! - `ProtocolError` - the drive did not follow the CiA 402 sequence, or a
//!   caller broke a precondition.
//!
//! `DriveError` wraps both and tags protocol errors with the operation that
//! raised them.

use crate::motion::SaveGroup;
use nano402_common::bus::RegisterError;
use nano402_common::drive::homing::HomingState;
use nano402_common::drive::motor::UnknownDriveMode;
use nano402_common::drive::state::{OperationMode, PowerState};
use thiserror::Error;

/// Sequencing and precondition violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Drive reports Not ready to switch on; software cannot recover it.
    #[error("Drive is not ready to switch on (error can't be solved by software)")]
    NotReadyToSwitchOn,

    #[error("Status word {0:#06x} matches no power state")]
    UnknownState(u16),

    #[error("Drive is still in operation enabled after disable operation")]
    CouldNotDisable,

    #[error("Drive is still in operation enabled after quick stop")]
    QuickStopFailed,

    /// Fault still present after the retry budget of reset pulses.
    #[error("Fault persists after {0} reset attempts")]
    FaultNotCleared(u8),

    /// The drive did not react to the last transition request.
    #[error("Drive stayed in {0} after a transition request")]
    TransitionStalled(PowerState),

    #[error("Saving parameter group {group:?} did not complete")]
    SaveTimeout { group: SaveGroup },

    #[error("Auto setup did not complete")]
    AutoSetupTimeout,

    /// Status word after shutdown lacks ready-to-switch-on, quick-stop or remote.
    #[error("Drive not prepared for auto setup (status word {status:#06x})")]
    PreconditionFailed { status: u16 },

    #[error("Can't halt in mode {0}")]
    InvalidHaltMode(OperationMode),

    #[error("Speed to zero ({to_zero}) must be below speed to switch ({to_switch})")]
    InvalidHomingSpeedOrder { to_zero: u32, to_switch: u32 },

    #[error("Unknown drive mode tag {0}")]
    UnknownDriveMode(u32),

    #[error("Status word {0:#06x} matches no homing state")]
    UnknownHomingState(u16),

    #[error("Unknown mode of operation {0}")]
    UnknownOperationMode(i8),

    #[error("Homing failed: {0}")]
    HomingFailed(HomingState),

    #[error("Homing did not complete")]
    HomingTimeout,
}

impl From<UnknownDriveMode> for ProtocolError {
    fn from(err: UnknownDriveMode) -> Self {
        Self::UnknownDriveMode(err.0)
    }
}

/// Error returned by every drive operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriveError {
    #[error(transparent)]
    Io(#[from] RegisterError),

    #[error("{operation} failed: {kind}")]
    Protocol {
        operation: &'static str,
        kind: ProtocolError,
    },
}

impl DriveError {
    #[inline]
    pub const fn protocol(operation: &'static str, kind: ProtocolError) -> Self {
        Self::Protocol { operation, kind }
    }

    /// Protocol error kind, if this is not an I/O error.
    pub const fn kind(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol { kind, .. } => Some(kind),
            Self::Io(_) => None,
        }
    }

    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Protocol { operation, .. } => Some(*operation),
            Self::Io(_) => None,
        }
    }
}

pub type DriveResult<T> = Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nano402_common::od::OdIndex;

    #[test]
    fn protocol_errors_name_the_operation() {
        let err = DriveError::protocol("quick_stop", ProtocolError::QuickStopFailed);
        assert_eq!(
            err.to_string(),
            "quick_stop failed: Drive is still in operation enabled after quick stop"
        );
        assert_eq!(err.operation(), Some("quick_stop"));
        assert_eq!(err.kind(), Some(&ProtocolError::QuickStopFailed));
    }

    #[test]
    fn io_errors_pass_through_unchanged() {
        let io = RegisterError::Timeout(OdIndex::new(0x6041, 0));
        let err = DriveError::from(io.clone());
        assert_eq!(err.to_string(), io.to_string());
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn unknown_drive_mode_converts() {
        assert_eq!(
            ProtocolError::from(UnknownDriveMode(7)),
            ProtocolError::UnknownDriveMode(7)
        );
    }
}
