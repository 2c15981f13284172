//! Scripted register bus for unit tests.
//!
//! - `set` gives a register a plain value; writes replace it.
//! - `script` queues read results for one address; the last entry repeats.
//!   A scripted address ignores writes on the read side.
//! - Every write and every sleep is recorded.
//! - Writes to the mode of operation are mirrored into the mode display.

use nano402_common::bus::{RegisterAccess, RegisterError};
use nano402_common::od::{self, BitWidth, OdIndex};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedWrite {
    pub address: OdIndex,
    pub value: i64,
    pub width: BitWidth,
}

#[derive(Default)]
pub struct ScriptedBus {
    values: RefCell<HashMap<OdIndex, i64>>,
    scripts: RefCell<HashMap<OdIndex, VecDeque<i64>>>,
    arrays: RefCell<HashMap<u16, Vec<i64>>>,
    failing: RefCell<HashSet<OdIndex>>,
    writes: RefCell<Vec<RecordedWrite>>,
    sleeps: RefCell<Vec<Duration>>,
    reads: RefCell<Vec<OdIndex>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: OdIndex, value: i64) {
        self.values.borrow_mut().insert(address, value);
    }

    pub fn script(&self, address: OdIndex, values: &[i64]) {
        self.scripts
            .borrow_mut()
            .insert(address, values.iter().copied().collect());
    }

    /// Script the status word with a sequence of raw values.
    pub fn script_status(&self, words: &[u16]) {
        let values: Vec<i64> = words.iter().map(|w| i64::from(*w)).collect();
        self.script(od::STATUS_WORD, &values);
    }

    pub fn set_array(&self, index: u16, values: Vec<i64>) {
        self.arrays.borrow_mut().insert(index, values);
    }

    pub fn fail_reads_of(&self, address: OdIndex) {
        self.failing.borrow_mut().insert(address);
    }

    pub fn value(&self, address: OdIndex) -> i64 {
        self.values.borrow().get(&address).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.borrow().clone()
    }

    pub fn writes_to(&self, address: OdIndex) -> Vec<i64> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.address == address)
            .map(|w| w.value)
            .collect()
    }

    pub fn control_word_writes(&self) -> Vec<u16> {
        self.writes_to(od::CONTROL_WORD)
            .into_iter()
            .map(|v| v as u16)
            .collect()
    }

    /// Rising edges of the fault-reset bit across control word writes.
    pub fn fault_reset_pulses(&self) -> usize {
        let words = self.control_word_writes();
        let mut previous = false;
        let mut pulses = 0;
        for word in words {
            let bit = word & 0x0080 != 0;
            if bit && !previous {
                pulses += 1;
            }
            previous = bit;
        }
        pulses
    }

    pub fn reads_of(&self, address: OdIndex) -> usize {
        self.reads.borrow().iter().filter(|a| **a == address).count()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.borrow().len()
    }

    pub fn clear_log(&self) {
        self.writes.borrow_mut().clear();
        self.sleeps.borrow_mut().clear();
        self.reads.borrow_mut().clear();
    }
}

impl RegisterAccess for ScriptedBus {
    type Device = ();

    fn read_integer(&self, _device: &(), address: OdIndex) -> Result<i64, RegisterError> {
        self.reads.borrow_mut().push(address);
        if self.failing.borrow().contains(&address) {
            return Err(RegisterError::Communication(format!("read of {address} failed")));
        }
        if let Some(queue) = self.scripts.borrow_mut().get_mut(&address) {
            let value = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            };
            if let Some(value) = value {
                return Ok(value);
            }
        }
        Ok(self.value(address))
    }

    fn write_integer(
        &self,
        _device: &(),
        value: i64,
        address: OdIndex,
        width: BitWidth,
    ) -> Result<(), RegisterError> {
        self.writes.borrow_mut().push(RecordedWrite {
            address,
            value,
            width,
        });
        self.set(address, value);
        if address == od::MODE_OF_OPERATION {
            self.set(od::MODE_OF_OPERATION_DISPLAY, value);
        }
        Ok(())
    }

    fn read_string(&self, _device: &(), address: OdIndex) -> Result<String, RegisterError> {
        Err(RegisterError::Rejected {
            address,
            reason: "no string objects".to_string(),
        })
    }

    fn read_array(&self, _device: &(), index: u16) -> Result<Vec<i64>, RegisterError> {
        self.arrays
            .borrow()
            .get(&index)
            .cloned()
            .ok_or_else(|| RegisterError::Rejected {
                address: OdIndex::new(index, 0),
                reason: "object does not exist".to_string(),
            })
    }

    fn sleep(&self, period: Duration) {
        self.sleeps.borrow_mut().push(period);
    }
}
