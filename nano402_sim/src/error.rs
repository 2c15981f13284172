//! Error type for the simulation layer.

use nano402_common::config::ConfigError;
use thiserror::Error;

/// Errors outside the register protocol: configuration and persistence.
#[derive(Debug, Error)]
pub enum SimError {
    /// Simulation settings could not be loaded or are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Drive snapshot could not be read or written.
    #[error("State persistence error: {0}")]
    Persistence(String),
}
