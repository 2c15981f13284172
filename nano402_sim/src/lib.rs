//! # nano402 Simulated Drive
//!
//! A software CiA 402 drive behind the [`RegisterAccess`] contract, for
//! tests, benchmarks and the `nano402` command-line tool.
//!
//! ## Modules
//!
//! - [`dictionary`] - Typed in-memory object dictionary
//! - [`drive`] - `SimulatedDrive`: power graph, mode processes, simulated clock
//! - [`config`] - Simulation timing and identity, loaded from TOML
//! - [`state`] - Drive snapshots persisted between tool invocations
//!
//! ```rust,ignore
//! let drive = SimulatedDrive::new(SimulationConfig::default());
//! let node = drive.node();
//! let power = PowerStateMachine::new(&drive, &node);
//! power.enable_operation()?;
//! ```
//!
//! [`RegisterAccess`]: nano402_common::bus::RegisterAccess

pub mod config;
pub mod dictionary;
pub mod drive;
pub mod error;
pub mod state;

pub use config::SimulationConfig;
pub use drive::{NodeId, SimulatedDrive};
pub use error::SimError;
pub use state::{DriveSnapshot, StatePersistence};
