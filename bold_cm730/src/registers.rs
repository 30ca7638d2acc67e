//! Control table layouts and unit conversions.
//!
//! - [`alarm`] - MX28 alarm / status error bits
//! - [`cm730`] - CM730 sub-controller registers
//! - [`mx28`] - MX28 actuator registers

pub mod alarm;
pub mod cm730;
pub mod mx28;
