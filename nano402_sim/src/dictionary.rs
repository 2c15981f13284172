//! Typed in-memory object dictionary.
//!
//! Every object has a data type and an access right. Bus writes are checked
//! against both the way a real drive answers an SDO: unknown objects,
//! read-only objects and width mismatches are rejected. Stored values are
//! sign-extended for signed types, zero-extended otherwise.

use nano402_common::bus::RegisterError;
use nano402_common::od::{self, BitWidth, OdIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ABORT_NO_OBJECT: &str = "object does not exist in the object dictionary";
const ABORT_READ_ONLY: &str = "attempt to write a read only object";
const ABORT_LENGTH: &str = "data type does not match, length of service parameter does not match";
const ABORT_NOT_STRING: &str = "object is not a visible string";

/// CiA 301 integer data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer8,
    Integer16,
    Integer32,
    Unsigned8,
    Unsigned16,
    Unsigned32,
}

impl DataType {
    pub const fn width(self) -> BitWidth {
        match self {
            Self::Integer8 | Self::Unsigned8 => BitWidth::Bits8,
            Self::Integer16 | Self::Unsigned16 => BitWidth::Bits16,
            Self::Integer32 | Self::Unsigned32 => BitWidth::Bits32,
        }
    }

    /// Interpret the low bits of `raw` as this type.
    pub const fn decode(self, raw: u64) -> i64 {
        match self {
            Self::Integer8 => raw as u8 as i8 as i64,
            Self::Integer16 => raw as u16 as i16 as i64,
            Self::Integer32 => raw as u32 as i32 as i64,
            Self::Unsigned8 => raw as u8 as i64,
            Self::Unsigned16 => raw as u16 as i64,
            Self::Unsigned32 => raw as u32 as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    data_type: DataType,
    access: Access,
    value: i64,
}

use Access::{ReadOnly as RO, ReadWrite as RW};
use DataType::{Integer8 as I8, Integer16 as I16, Integer32 as I32, Unsigned16 as U16, Unsigned32 as U32};

/// Factory values of every integer object the drive implements.
const DEFAULT_OBJECTS: &[(OdIndex, DataType, Access, i64)] = &[
    // Communication profile
    (OdIndex::new(od::STORE_PARAMETERS, 1), U32, RW, 1),
    (OdIndex::new(od::STORE_PARAMETERS, 2), U32, RW, 1),
    (OdIndex::new(od::STORE_PARAMETERS, 3), U32, RW, 1),
    (OdIndex::new(od::STORE_PARAMETERS, 4), U32, RW, 1),
    (OdIndex::new(od::STORE_PARAMETERS, 5), U32, RW, 1),
    (OdIndex::new(od::STORE_PARAMETERS, 6), U32, RW, 1),
    // Manufacturer specific
    (od::POLE_PAIR_COUNT, U32, RW, 50),
    (od::MAX_MOTOR_CURRENT, U32, RW, 1000),
    (od::IDLE_CURRENT, U32, RW, 0),
    (od::RATED_CURRENT, U32, RW, 1800),
    (od::MAX_CURRENT_DURATION, U32, RW, 100),
    (od::MOTOR_DRIVE_SUBMODE, U32, RW, 0x01),
    (od::INPUT_SPECIAL_FUNCTION, U32, RW, 0),
    (od::INPUT_FUNCTION_INVERTED, U32, RW, 0),
    (od::INPUT_RANGE_SELECT, U32, RW, 0),
    (od::LIMIT_SWITCH_ERROR_OPTION, I16, RW, 1),
    // Device profile
    (od::CONTROL_WORD, U16, RW, 0),
    (od::STATUS_WORD, U16, RO, 0),
    (od::VL_TARGET_VELOCITY, I16, RW, 0),
    (od::VL_VELOCITY_DEMAND, I16, RO, 0),
    (od::VL_VELOCITY_ACTUAL, I16, RO, 0),
    (OdIndex::new(od::VL_ACCELERATION, 1), U32, RW, 500),
    (OdIndex::new(od::VL_ACCELERATION, 2), U16, RW, 1),
    (OdIndex::new(od::VL_DECELERATION, 1), U32, RW, 500),
    (OdIndex::new(od::VL_DECELERATION, 2), U16, RW, 1),
    (od::HALT_OPTION, I16, RW, 1),
    (od::MODE_OF_OPERATION, I8, RW, 0),
    (od::MODE_OF_OPERATION_DISPLAY, I8, RO, 0),
    (od::POSITION_ACTUAL, I32, RO, 0),
    (od::VELOCITY_ACTUAL, I32, RO, 0),
    (od::TARGET_POSITION, I32, RW, 0),
    (od::MAX_MOTOR_SPEED, U32, RW, 3000),
    (od::PROFILE_VELOCITY, U32, RW, 200),
    (od::PROFILE_ACCELERATION, U32, RW, 500),
    (OdIndex::new(od::GEAR_RATIO, 1), U32, RW, 1),
    (OdIndex::new(od::GEAR_RATIO, 2), U32, RW, 1),
    (OdIndex::new(od::FEED_CONSTANT, 1), U32, RW, 1),
    (OdIndex::new(od::FEED_CONSTANT, 2), U32, RW, 1),
    (od::HOMING_METHOD, I8, RW, 35),
    (od::HOMING_SPEED_SWITCH, U32, RW, 50),
    (od::HOMING_SPEED_ZERO, U32, RW, 10),
    (od::HOMING_ACCELERATION, U32, RW, 500),
    (od::SI_UNIT_POSITION, U32, RW, 0xFF41_0000),
    (od::SI_UNIT_VELOCITY, U32, RW, 0x00B4_4700),
    (od::DIGITAL_INPUTS, U32, RO, 0),
];

#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    entries: BTreeMap<OdIndex, Entry>,
    strings: BTreeMap<OdIndex, String>,
}

impl ObjectDictionary {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// The factory dictionary of a simulated drive called `device_name`.
    pub fn with_defaults(device_name: &str) -> Self {
        let mut dictionary = Self::new();
        for &(address, data_type, access, value) in DEFAULT_OBJECTS {
            dictionary.define(address, data_type, access, value);
        }
        dictionary.define_string(od::DEVICE_NAME, device_name);
        dictionary
    }

    pub fn define(&mut self, address: OdIndex, data_type: DataType, access: Access, value: i64) {
        let value = data_type.decode(data_type.width().truncate(value));
        self.entries.insert(
            address,
            Entry {
                data_type,
                access,
                value,
            },
        );
    }

    pub fn define_string(&mut self, address: OdIndex, value: impl Into<String>) {
        self.strings.insert(address, value.into());
    }

    pub fn contains(&self, address: OdIndex) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn data_type(&self, address: OdIndex) -> Option<DataType> {
        self.entries.get(&address).map(|e| e.data_type)
    }

    /// Current value, `None` for unknown objects.
    pub fn get(&self, address: OdIndex) -> Option<i64> {
        self.entries.get(&address).map(|e| e.value)
    }

    /// Drive-internal update. Skips access checks; unknown objects are ignored.
    pub fn set(&mut self, address: OdIndex, value: i64) {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.value = entry
                .data_type
                .decode(entry.data_type.width().truncate(value));
        }
    }

    // ─── Bus Access ─────────────────────────────────────────────────

    pub fn read(&self, address: OdIndex) -> Result<i64, RegisterError> {
        self.get(address)
            .ok_or_else(|| rejected(address, ABORT_NO_OBJECT))
    }

    /// Bus write. Returns the value as stored.
    pub fn write(&mut self, address: OdIndex, value: i64, width: BitWidth) -> Result<i64, RegisterError> {
        let entry = self
            .entries
            .get_mut(&address)
            .ok_or_else(|| rejected(address, ABORT_NO_OBJECT))?;
        if entry.access == Access::ReadOnly {
            return Err(rejected(address, ABORT_READ_ONLY));
        }
        if entry.data_type.width() != width {
            return Err(rejected(address, ABORT_LENGTH));
        }
        entry.value = entry.data_type.decode(width.truncate(value));
        Ok(entry.value)
    }

    pub fn read_string(&self, address: OdIndex) -> Result<String, RegisterError> {
        match self.strings.get(&address) {
            Some(text) => Ok(text.clone()),
            None if self.contains(address) => Err(rejected(address, ABORT_NOT_STRING)),
            None => Err(rejected(address, ABORT_NO_OBJECT)),
        }
    }

    /// Writable objects and their values, in address order.
    pub fn writable(&self) -> impl Iterator<Item = (OdIndex, i64)> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| e.access == Access::ReadWrite)
            .map(|(address, e)| (*address, e.value))
    }
}

fn rejected(address: OdIndex, reason: &str) -> RegisterError {
    RegisterError::Rejected {
        address,
        reason: reason.to_string(),
    }
}
