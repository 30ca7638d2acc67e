//! Per-device register tables filled by bulk reads.

use crate::error::TableError;
use crate::packet::make_word;
use crate::registers::alarm::Mx28Alarm;
use crate::registers::cm730;

/// Size of the largest control table on the bus (CM730).
pub const TABLE_SIZE: usize = cm730::MAXNUM_ADDRESS;

/// Raw bytes of one device's last bulk-read response.
///
/// Bytes are stored at their control table address. Only the window
/// `start..start + length` was requested, and accessors reject anything
/// outside it.
#[derive(Debug, Clone)]
pub struct DeviceRegisterTable {
    start: u8,
    length: u8,
    data: [u8; TABLE_SIZE],
    alarm: Mx28Alarm,
}

impl DeviceRegisterTable {
    pub(crate) fn new(start: u8, length: u8) -> Self {
        Self {
            start,
            length,
            data: [0; TABLE_SIZE],
            alarm: Mx28Alarm::empty(),
        }
    }

    #[inline]
    pub fn start_address(&self) -> u8 {
        self.start
    }

    #[inline]
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Error byte of the status packet that last filled this table.
    #[inline]
    pub fn alarm(&self) -> Mx28Alarm {
        self.alarm
    }

    fn check(&self, address: u8) -> Result<usize, TableError> {
        let end = self.start as usize + self.length as usize;
        if address < self.start || address as usize >= end {
            return Err(TableError {
                address,
                start: self.start,
                end: end as u8,
            });
        }
        Ok(address as usize)
    }

    pub fn read_byte(&self, address: impl Into<u8>) -> Result<u8, TableError> {
        let index = self.check(address.into())?;
        Ok(self.data[index])
    }

    /// Little-endian word at `address` and `address + 1`. Both must be inside the window.
    pub fn read_word(&self, address: impl Into<u8>) -> Result<u16, TableError> {
        let address = address.into();
        let low = self.check(address)?;
        let high = self.check(address.wrapping_add(1))?;
        Ok(make_word(self.data[low], self.data[high]))
    }

    /// Copy a response payload into the window. Bytes beyond the window are dropped.
    pub(crate) fn fill(&mut self, payload: &[u8], alarm: Mx28Alarm) {
        let start = self.start as usize;
        let count = payload.len().min(self.length as usize).min(TABLE_SIZE - start);
        self.data[start..start + count].copy_from_slice(&payload[..count]);
        self.alarm = alarm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::mx28::Mx28Register;

    #[test]
    fn reads_inside_window() {
        let mut table = DeviceRegisterTable::new(36, 8);
        table.fill(&[0x00, 0x08, 0x10, 0x00, 0x20, 0x04, 120, 41], Mx28Alarm::empty());
        assert_eq!(table.read_word(Mx28Register::PresentPositionL), Ok(0x0800));
        assert_eq!(table.read_word(Mx28Register::PresentLoadL), Ok(0x0420));
        assert_eq!(table.read_byte(Mx28Register::PresentTemperature), Ok(41));
    }

    #[test]
    fn rejects_outside_window() {
        let table = DeviceRegisterTable::new(36, 8);
        assert!(table.read_byte(Mx28Register::GoalPositionL).is_err());
        assert!(table.read_byte(Mx28Register::RegisteredInstruction).is_err());
        // Low byte inside, high byte outside.
        let err = table.read_word(Mx28Register::PresentTemperature).unwrap_err();
        assert_eq!(err.address, 44);
        assert_eq!(err.end, 44);
    }

    #[test]
    fn fill_records_alarm_and_truncates() {
        let mut table = DeviceRegisterTable::new(0, 2);
        table.fill(&[1, 2, 3, 4], Mx28Alarm::OVERLOAD);
        assert_eq!(table.read_word(0u8), Ok(0x0201));
        assert_eq!(table.alarm(), Mx28Alarm::OVERLOAD);
        assert!(table.read_byte(2u8).is_err());
    }
}
