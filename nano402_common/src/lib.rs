//! nano402 Common Library
//!
//! Shared definitions for driving a CiA 402 ("DS402") motor controller
//! through an object-dictionary register interface.
//!
//! # Module Structure
//!
//! - [`od`] - Object dictionary addressing and the register map
//! - [`bus`] - `RegisterAccess` collaborator trait and its I/O error
//! - [`drive`] - Control/status words, power and homing states, modes,
//!   user units, motor parameters and the commissioning profile
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use nano402_common::prelude::*;
//!
//! let status = StatusWord::from_bits_retain(0x0027);
//! assert_eq!(PowerState::from_status_word(status.bits()), Some(PowerState::OperationEnabled));
//! ```

pub mod bus;
pub mod config;
pub mod drive;
pub mod od;
pub mod prelude;
