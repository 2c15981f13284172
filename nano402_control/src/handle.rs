//! Borrowed drive handle.
//!
//! `DriveRef` pairs a register bus with one connected device and adds the
//! typed accessors the controllers use. It is `Copy`; every controller holds
//! one by value.

use crate::error::DriveResult;
use nano402_common::bus::RegisterAccess;
use nano402_common::drive::words::{ControlWord, StatusWord};
use nano402_common::od::{self, BitWidth, OdIndex};
use std::time::Duration;
use tracing::{debug, trace};

pub struct DriveRef<'a, R: RegisterAccess> {
    bus: &'a R,
    device: &'a R::Device,
}

impl<R: RegisterAccess> Clone for DriveRef<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: RegisterAccess> Copy for DriveRef<'_, R> {}

impl<'a, R: RegisterAccess> DriveRef<'a, R> {
    pub const fn new(bus: &'a R, device: &'a R::Device) -> Self {
        Self { bus, device }
    }

    pub const fn bus(&self) -> &'a R {
        self.bus
    }

    pub const fn device(&self) -> &'a R::Device {
        self.device
    }

    // ─── Raw Access ─────────────────────────────────────────────────

    pub fn read(&self, address: OdIndex) -> DriveResult<i64> {
        let value = self.bus.read_integer(self.device, address)?;
        trace!(%address, value, "read");
        Ok(value)
    }

    pub fn write(&self, address: OdIndex, value: i64, width: BitWidth) -> DriveResult<()> {
        trace!(%address, value, bits = width.bits(), "write");
        self.bus.write_integer(self.device, value, address, width)?;
        Ok(())
    }

    pub fn read_string(&self, address: OdIndex) -> DriveResult<String> {
        Ok(self.bus.read_string(self.device, address)?)
    }

    pub fn read_array(&self, index: u16) -> DriveResult<Vec<i64>> {
        Ok(self.bus.read_array(self.device, index)?)
    }

    pub fn sleep(&self, period: Duration) {
        self.bus.sleep(period);
    }

    // ─── Typed Access ───────────────────────────────────────────────

    /// Read an UNSIGNED32 register.
    pub fn read_u32(&self, address: OdIndex) -> DriveResult<u32> {
        Ok(self.read(address)? as u32)
    }

    pub fn write_u32(&self, address: OdIndex, value: u32) -> DriveResult<()> {
        self.write(address, i64::from(value), BitWidth::Bits32)
    }

    pub fn read_i32(&self, address: OdIndex) -> DriveResult<i32> {
        Ok(self.read(address)? as i32)
    }

    pub fn write_i32(&self, address: OdIndex, value: i32) -> DriveResult<()> {
        self.write(address, i64::from(value), BitWidth::Bits32)
    }

    pub fn read_i16(&self, address: OdIndex) -> DriveResult<i16> {
        Ok(self.read(address)? as i16)
    }

    pub fn write_i16(&self, address: OdIndex, value: i16) -> DriveResult<()> {
        self.write(address, i64::from(value), BitWidth::Bits16)
    }

    // ─── Control / Status Words ─────────────────────────────────────

    pub fn status_word(&self) -> DriveResult<StatusWord> {
        Ok(StatusWord::from_bits_retain(self.read(od::STATUS_WORD)? as u16))
    }

    pub fn control_word(&self) -> DriveResult<ControlWord> {
        Ok(ControlWord::from_bits_retain(self.read(od::CONTROL_WORD)? as u16))
    }

    pub fn write_control_word(&self, word: ControlWord) -> DriveResult<()> {
        debug!(control_word = format_args!("{:#06x}", word.bits()), "control word");
        self.write(od::CONTROL_WORD, i64::from(word.bits()), BitWidth::Bits16)
    }

    /// Read-modify-write of the control word. Returns the written value.
    pub fn update_control_word(
        &self,
        edit: impl FnOnce(&mut ControlWord),
    ) -> DriveResult<ControlWord> {
        let mut word = self.control_word()?;
        edit(&mut word);
        self.write_control_word(word)?;
        Ok(word)
    }

    /// Read-modify-write of an UNSIGNED32 register.
    pub fn update_u32(&self, address: OdIndex, edit: impl FnOnce(u32) -> u32) -> DriveResult<u32> {
        let value = edit(self.read_u32(address)?);
        self.write_u32(address, value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBus;

    #[test]
    fn update_control_word_keeps_untouched_bits() {
        let bus = ScriptedBus::new();
        bus.set(od::CONTROL_WORD, 0x010F);
        let drive = DriveRef::new(&bus, &());

        let written = drive
            .update_control_word(|w| w.insert(ControlWord::START))
            .unwrap();

        assert_eq!(written.bits(), 0x011F);
        assert_eq!(bus.control_word_writes(), vec![0x011F]);
    }

    #[test]
    fn typed_reads_reinterpret_register_width() {
        let bus = ScriptedBus::new();
        bus.set(od::POSITION_ACTUAL, 0xFFFF_FFFF);
        bus.set(od::VL_VELOCITY_ACTUAL, 0xFF38);
        let drive = DriveRef::new(&bus, &());

        assert_eq!(drive.read_i32(od::POSITION_ACTUAL).unwrap(), -1);
        assert_eq!(drive.read_i16(od::VL_VELOCITY_ACTUAL).unwrap(), -200);
    }

    #[test]
    fn io_errors_propagate() {
        let bus = ScriptedBus::new();
        bus.fail_reads_of(od::STATUS_WORD);
        let drive = DriveRef::new(&bus, &());

        assert!(matches!(
            drive.status_word(),
            Err(crate::error::DriveError::Io(_))
        ));
    }
}
