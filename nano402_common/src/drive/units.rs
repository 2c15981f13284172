//! User-unit descriptors.
//!
//! Position (0x60A8) and velocity (0x60A9) units share one 32-bit layout:
//!
//! ```text
//!  31      24 23      16 15       8 7        0
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ exponent │   unit   │ time base│ reserved │
//! └──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Position units leave bits 0–15 alone, velocity units bits 0–7. The
//! exponent byte is a two's-complement power of ten.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Code Tables ────────────────────────────────────────────────────

/// Physical unit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PhysicalUnit {
    Meter = 0x01,
    Radian = 0x10,
    Grade = 0x40,
    Degree = 0x41,
    ArcMinute = 0x42,
    ArcSecond = 0x43,
    Revolution = 0xB4,
    Inch = 0xC1,
    Foot = 0xC2,
}

impl PhysicalUnit {
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Meter),
            0x10 => Some(Self::Radian),
            0x40 => Some(Self::Grade),
            0x41 => Some(Self::Degree),
            0x42 => Some(Self::ArcMinute),
            0x43 => Some(Self::ArcSecond),
            0xB4 => Some(Self::Revolution),
            0xC1 => Some(Self::Inch),
            0xC2 => Some(Self::Foot),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Meter => "m",
            Self::Radian => "rad",
            Self::Grade => "gon",
            Self::Degree => "°",
            Self::ArcMinute => "'",
            Self::ArcSecond => "\"",
            Self::Revolution => "rev",
            Self::Inch => "in",
            Self::Foot => "ft",
        }
    }
}

/// Time base codes for velocity units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TimeBase {
    Second = 0x03,
    Minute = 0x47,
    Hour = 0x48,
    Day = 0x49,
    Year = 0x4A,
}

impl TimeBase {
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(Self::Second),
            0x47 => Some(Self::Minute),
            0x48 => Some(Self::Hour),
            0x49 => Some(Self::Day),
            0x4A => Some(Self::Year),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "min",
            Self::Hour => "h",
            Self::Day => "d",
            Self::Year => "a",
        }
    }
}

/// Largest decimal exponent the drive accepts, in either direction.
pub const MAX_EXPONENT: i8 = 6;

/// Exponent byte for a power of ten in `-6..=6`.
#[inline]
pub const fn exponent_code(power: i8) -> Option<u8> {
    if power < -MAX_EXPONENT || power > MAX_EXPONENT {
        None
    } else {
        Some(power as u8)
    }
}

/// Power of ten for an exponent byte (`0x00..=0x06`, `0xFA..=0xFF`).
#[inline]
pub const fn exponent_from_code(code: u8) -> Option<i8> {
    let power = code as i8;
    if power < -MAX_EXPONENT || power > MAX_EXPONENT {
        None
    } else {
        Some(power)
    }
}

/// Serde bridge so profiles can write exponents as signed numbers.
mod signed_byte {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(*value as i8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        i8::deserialize(deserializer).map(|v| v as u8)
    }
}

fn write_scaled(f: &mut fmt::Formatter<'_>, unit: u8, exponent: u8) -> fmt::Result {
    match exponent_from_code(exponent) {
        Some(0) => {}
        Some(power) => write!(f, "1e{power} ")?,
        None => write!(f, "exp {exponent:#04x} ")?,
    }
    match PhysicalUnit::from_code(unit) {
        Some(unit) => f.write_str(unit.symbol()),
        None => write!(f, "unit {unit:#04x}"),
    }
}

// ─── Position Units ─────────────────────────────────────────────────

/// Position user unit (0x60A8): unit code and exponent byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUnits {
    pub unit: u8,
    #[serde(with = "signed_byte")]
    pub exponent: u8,
}

impl PositionUnits {
    const KEEP_MASK: u32 = 0x0000_FFFF;

    pub const fn new(unit: u8, exponent: u8) -> Self {
        Self { unit, exponent }
    }

    pub const fn from_register(raw: u32) -> Self {
        Self {
            unit: (raw >> 16) as u8,
            exponent: (raw >> 24) as u8,
        }
    }

    /// Merge into the current register value, keeping bits 0–15.
    pub const fn pack_into(self, raw: u32) -> u32 {
        (raw & Self::KEEP_MASK) | (self.unit as u32) << 16 | (self.exponent as u32) << 24
    }
}

impl fmt::Display for PositionUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.unit, self.exponent)
    }
}

// ─── Velocity Units ─────────────────────────────────────────────────

/// Velocity user unit (0x60A9): unit code, exponent byte and time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityUnits {
    pub unit: u8,
    #[serde(with = "signed_byte")]
    pub exponent: u8,
    pub time_base: u8,
}

impl VelocityUnits {
    const KEEP_MASK: u32 = 0x0000_00FF;

    pub const fn new(unit: u8, exponent: u8, time_base: u8) -> Self {
        Self {
            unit,
            exponent,
            time_base,
        }
    }

    pub const fn from_register(raw: u32) -> Self {
        Self {
            time_base: (raw >> 8) as u8,
            unit: (raw >> 16) as u8,
            exponent: (raw >> 24) as u8,
        }
    }

    /// Merge into the current register value, keeping bits 0–7.
    pub const fn pack_into(self, raw: u32) -> u32 {
        (raw & Self::KEEP_MASK)
            | (self.time_base as u32) << 8
            | (self.unit as u32) << 16
            | (self.exponent as u32) << 24
    }
}

impl fmt::Display for VelocityUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.unit, self.exponent)?;
        match TimeBase::from_code(self.time_base) {
            Some(base) => write!(f, "/{}", base.symbol()),
            None => write!(f, "/time {:#04x}", self.time_base),
        }
    }
}

// ─── Feed & Gear ────────────────────────────────────────────────────

/// Feed constant (0x6092): `feed` user units per `shaft_revolutions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConstant {
    pub feed: u32,
    pub shaft_revolutions: u32,
}

/// Gear ratio (0x6091): `motor_revolutions` per `shaft_revolutions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearRatio {
    pub motor_revolutions: u32,
    pub shaft_revolutions: u32,
}

impl Default for FeedConstant {
    fn default() -> Self {
        Self {
            feed: 1,
            shaft_revolutions: 1,
        }
    }
}

impl Default for GearRatio {
    fn default() -> Self {
        Self {
            motor_revolutions: 1,
            shaft_revolutions: 1,
        }
    }
}
