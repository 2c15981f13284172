//! Register access contract and I/O error type.
//!
//! This module defines:
//! - `RegisterAccess` trait - Interface to the device-management layer that
//!   owns the bus, the connection and the wire encoding
//! - `RegisterError` enum - The single I/O error surfaced by that layer
//!
//! The core never opens, scans or closes anything. It is handed a
//! `RegisterAccess` implementation plus a handle to an already connected
//! device, and propagates every `RegisterError` unchanged.

use crate::od::{BitWidth, OdIndex};
use std::time::Duration;
use thiserror::Error;

/// Error types for register I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Communication with the device failed or was lost
    #[error("Communication error: {0}")]
    Communication(String),

    /// The device answered but refused the request
    #[error("Device rejected access to {address}: {reason}")]
    Rejected {
        /// Address that was accessed
        address: OdIndex,
        /// Device-supplied reason (e.g. SDO abort code text)
        reason: String,
    },

    /// No answer within the transport's own deadline
    #[error("Timed out accessing {0}")]
    Timeout(OdIndex),
}

/// Trait implemented by the device-management layer.
///
/// Methods take `&self`: controllers share one implementation for the
/// duration of an operation. Implementations that keep mutable state use
/// interior mutability.
///
/// # Timing
///
/// Polling loops in the core wait through [`RegisterAccess::sleep`]. The
/// default blocks the calling thread; a simulated bus can advance its own
/// clock instead.
pub trait RegisterAccess {
    /// Handle to a connected device.
    type Device;

    /// Read a signed or unsigned integer at `address`, sign/zero-extended.
    fn read_integer(&self, device: &Self::Device, address: OdIndex) -> Result<i64, RegisterError>;

    /// Write `value` truncated to `width` bits at `address`.
    fn write_integer(
        &self,
        device: &Self::Device,
        value: i64,
        address: OdIndex,
        width: BitWidth,
    ) -> Result<(), RegisterError>;

    /// Read a visible string object.
    fn read_string(&self, device: &Self::Device, address: OdIndex) -> Result<String, RegisterError>;

    /// Read every subindex of an array object, starting at subindex 0.
    fn read_array(&self, device: &Self::Device, index: u16) -> Result<Vec<i64>, RegisterError>;

    /// Block for `period` between polls.
    fn sleep(&self, period: Duration) {
        std::thread::sleep(period);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    type Device = T::Device;

    fn read_integer(&self, device: &Self::Device, address: OdIndex) -> Result<i64, RegisterError> {
        (**self).read_integer(device, address)
    }

    fn write_integer(
        &self,
        device: &Self::Device,
        value: i64,
        address: OdIndex,
        width: BitWidth,
    ) -> Result<(), RegisterError> {
        (**self).write_integer(device, value, address, width)
    }

    fn read_string(&self, device: &Self::Device, address: OdIndex) -> Result<String, RegisterError> {
        (**self).read_string(device, address)
    }

    fn read_array(&self, device: &Self::Device, index: u16) -> Result<Vec<i64>, RegisterError> {
        (**self).read_array(device, index)
    }

    fn sleep(&self, period: Duration) {
        (**self).sleep(period)
    }
}
