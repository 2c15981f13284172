//! CiA 402 drive types shared by the controllers and the simulator.
//!
//! Organized by concern: control/status word bit sets, derived states and
//! operation modes, homing types, user units, motor parameters, and the
//! TOML commissioning profile.

pub mod homing;
pub mod motor;
pub mod profile;
pub mod state;
pub mod units;
pub mod words;
