//! System-wide constants for the bold motion workspace.
//!
//! Single source of truth for device ids, bus limits and default timings.
//! Imported by all crates.

use static_assertions::const_assert;

/// Id of the CM730 sub-controller on the bus.
pub const CM730_ID: u8 = 200;

/// Broadcast device id. Devices do not answer packets sent here.
pub const BROADCAST_ID: u8 = 0xFE;

/// Lowest actuator id.
pub const MIN_JOINT_ID: u8 = 1;

/// Highest actuator id.
pub const MAX_JOINT_ID: u8 = 20;

/// Number of actuators on the bus.
pub const JOINT_COUNT: usize = MAX_JOINT_ID as usize;

/// Number of devices answering a bulk read (sub-controller + actuators).
pub const DEVICE_COUNT: usize = 1 + JOINT_COUNT;

/// Maximum number of parameter bytes in an outgoing packet.
pub const MAX_TX_PARAMS: usize = 256;

/// Maximum number of parameter bytes in an incoming packet.
pub const MAX_RX_PARAMS: usize = 1024;

/// Size of an actuator's inbound buffer. Larger sync writes are logged.
pub const DXL_INBOUND_BUFFER: usize = 143;

/// Default link speed in bits per second.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Default motion cycle period in milliseconds.
pub const DEFAULT_PERIOD_MS: u64 = 8;

/// Default RT priority of the motion thread.
pub const DEFAULT_RT_PRIORITY: i32 = 31;

/// Default decision loop period in milliseconds (~30 Hz).
pub const DECISION_PERIOD_MS: u64 = 33;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bold/motion.toml";

const_assert!(CM730_ID > MAX_JOINT_ID);
const_assert!(BROADCAST_ID > CM730_ID);
const_assert!(DEVICE_COUNT == 21);
