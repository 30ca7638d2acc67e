//! # Bold CM730 Library
//!
//! Protocol engine for the CM730 sub-controller and the MX28 actuators
//! behind it, speaking Dynamixel protocol 1.0 over a serial link.
//!
//! # Module Structure
//!
//! - [`packet`] - Frame layout, checksums, instruction packet builder
//! - [`cm730`] - `Cm730` engine: transmit, reassemble, validate
//! - [`bulk_read`] - Pre-built bulk read requests and their device tables
//! - [`table`] - Register window of one device
//! - [`snapshot`] - Decoded dynamic and static device state
//! - [`registers`] - Control table addresses and unit conversions
//! - [`link`] - `SerialLink` trait, serial port backend, link registry
//! - [`sim`] - In-process simulated bus for tests and hardware-less runs
//! - [`error`] - Communication, link and table errors
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        bold_cm730                         │
//! │  ┌────────────┐    ┌──────────────┐    ┌───────────────┐  │
//! │  │ BulkRead / │◄──►│    Cm730     │◄──►│  SerialLink   │  │
//! │  │ TxPacket   │    │   (engine)   │    │ (trait object)│  │
//! │  └────────────┘    └──────────────┘    └───────┬───────┘  │
//! │                                                │          │
//! │                              ┌─────────────────┴───────┐  │
//! │                              ▼                         ▼  │
//! │                     SerialportLink            SimulatedBus│
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod bulk_read;
pub mod cm730;
pub mod error;
pub mod link;
pub mod packet;
pub mod registers;
pub mod sim;
pub mod snapshot;
pub mod table;

pub use crate::bulk_read::{BulkRead, PacketFlow};
pub use crate::cm730::{Cm730, Reply};
pub use crate::error::{CommError, LinkError, TableError};
pub use crate::link::{LinkRegistry, SerialLink, SerialportLink};
pub use crate::registers::alarm::Mx28Alarm;
pub use crate::sim::{SimHandle, SimulatedBus};
pub use crate::snapshot::{Cm730Snapshot, Mx28Snapshot, StaticCm730State, StaticMx28State};
pub use crate::table::DeviceRegisterTable;
