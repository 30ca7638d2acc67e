//! MX28 alarm flags.
//!
//! The error byte of every status packet, and the `ALARM_LED` /
//! `ALARM_SHUTDOWN` registers, share this bit layout. Bit 7 is unused.

use bitflags::bitflags;
use serde::{Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Alarm state of one actuator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mx28Alarm: u8 {
        /// Supply outside the configured voltage limits.
        const INPUT_VOLTAGE = 1 << 0;
        /// Goal position outside the angle limits.
        const ANGLE_LIMIT = 1 << 1;
        /// Internal temperature above the configured limit.
        const OVERHEATING = 1 << 2;
        /// Command beyond the range of usage.
        const RANGE = 1 << 3;
        /// Bad checksum on a received instruction packet.
        const CHECKSUM = 1 << 4;
        /// Load cannot be held with the configured max torque.
        const OVERLOAD = 1 << 5;
        /// Undefined instruction, or ACTION without REG_WRITE.
        const INSTRUCTION = 1 << 6;
    }
}

impl Mx28Alarm {
    /// Name of a single alarm flag.
    pub const fn flag_name(flag: Mx28Alarm) -> &'static str {
        match flag.bits() {
            0x01 => "Input Voltage Limit Breached",
            0x02 => "Angle Limit Breached",
            0x04 => "Overheated",
            0x08 => "Out Of Range",
            0x10 => "Checksum Error",
            0x20 => "Overloaded",
            0x40 => "Instruction Error",
            _ => "Unknown",
        }
    }

    #[inline]
    pub const fn has_error(self) -> bool {
        !self.is_empty()
    }

    /// Flags that differ between two alarm states.
    pub fn diff(self, other: Mx28Alarm) -> Mx28Alarm {
        self.symmetric_difference(other)
    }
}

impl Serialize for Mx28Alarm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl fmt::Display for Mx28Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, flag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(Mx28Alarm::flag_name(flag))?;
        }
        Ok(())
    }
}
