//! Error types of the protocol engine.
//!
//! - `CommError` - outcome of a single exchange on the bus
//! - `LinkError` - opening or driving the serial link itself
//! - `TableError` - register access outside a device table's read window

use thiserror::Error;

/// Failure of one packet exchange.
///
/// Expected during normal hardware jitter. Every engine call reports one of
/// these instead of panicking, and never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CommError {
    /// Instruction packet too large for the link's parameter limit.
    #[error("TX_CORRUPT")]
    TxCorrupt,

    /// The link accepted fewer bytes than the frame holds.
    #[error("TX_FAIL")]
    TxFail,

    /// No byte arrived within the response window.
    #[error("RX_TIMEOUT")]
    RxTimeout,

    /// Bytes arrived but framing or checksum validation failed.
    #[error("RX_CORRUPT")]
    RxCorrupt,
}

impl CommError {
    /// Human-readable name of a result, `SUCCESS` included.
    pub fn describe<T>(result: &Result<T, CommError>) -> &'static str {
        match result {
            Ok(_) => "SUCCESS",
            Err(CommError::TxCorrupt) => "TX_CORRUPT",
            Err(CommError::TxFail) => "TX_FAIL",
            Err(CommError::RxTimeout) => "RX_TIMEOUT",
            Err(CommError::RxCorrupt) => "RX_CORRUPT",
        }
    }
}

/// Errors of the serial link layer.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// Device could not be opened.
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// I/O error on an open link.
    #[error("Link I/O error: {0}")]
    Io(String),

    /// No link factory registered under that name.
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// Baud rate rejected by the device.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),
}

impl From<serialport::Error> for LinkError {
    fn from(e: serialport::Error) -> Self {
        LinkError::Io(e.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e.to_string())
    }
}

/// Register access outside what a bulk read requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Address {address} outside read window {start}..{end}")]
pub struct TableError {
    pub address: u8,
    pub start: u8,
    pub end: u8,
}
