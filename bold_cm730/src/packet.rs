//! Dynamixel 1.0 packet framing.
//!
//! ```text
//! ┌──────┬──────┬────┬────────┬─────────────┬────────────┬──────────┐
//! │ 0xFF │ 0xFF │ id │ length │ instruction │ params ... │ checksum │
//! └──────┴──────┴────┴────────┴─────────────┴────────────┴──────────┘
//! ```
//!
//! `length` counts the instruction (or error) byte, the parameters and the
//! checksum. A frame therefore occupies `length + 4` bytes. The checksum is the
//! bitwise NOT of the low byte of the sum of every byte from `id` to the last
//! parameter.

use crate::error::CommError;
use bold_common::consts::MAX_TX_PARAMS;
use static_assertions::const_assert;
use std::fmt;

/// Offset of the device id.
pub const ID: usize = 2;
/// Offset of the length byte.
pub const LENGTH: usize = 3;
/// Offset of the instruction byte (outgoing) or error byte (incoming).
pub const INSTRUCTION: usize = 4;
/// Offset of the error byte in a status packet.
pub const ERROR: usize = 4;
/// Offset of the first parameter.
pub const PARAMETER: usize = 5;

/// Header, id, length, instruction and checksum.
pub const FRAME_OVERHEAD: usize = 6;

/// Largest frame the transmit path accepts (exclusive).
pub const MAX_TX_FRAME: usize = MAX_TX_PARAMS + FRAME_OVERHEAD;

const_assert!(MAX_TX_FRAME > 255 + 4);

// ─── Instructions ───────────────────────────────────────────────────

/// Instruction codes understood by the CM730 and MX28 firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    Ping = 1,
    Read = 2,
    Write = 3,
    RegWrite = 4,
    Action = 5,
    Reset = 6,
    DigitalReset = 7,
    SystemRead = 12,
    SystemWrite = 13,
    SyncWrite = 0x83,
    BulkRead = 0x92,
}

impl Instruction {
    /// Decode a raw instruction byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Instruction::Ping,
            2 => Instruction::Read,
            3 => Instruction::Write,
            4 => Instruction::RegWrite,
            5 => Instruction::Action,
            6 => Instruction::Reset,
            7 => Instruction::DigitalReset,
            12 => Instruction::SystemRead,
            13 => Instruction::SystemWrite,
            0x83 => Instruction::SyncWrite,
            0x92 => Instruction::BulkRead,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Instruction::Ping => "PING",
            Instruction::Read => "READ",
            Instruction::Write => "WRITE",
            Instruction::RegWrite => "REG_WRITE",
            Instruction::Action => "ACTION",
            Instruction::Reset => "RESET",
            Instruction::DigitalReset => "DIGITAL_RESET",
            Instruction::SystemRead => "SYSTEM_READ",
            Instruction::SystemWrite => "SYSTEM_WRITE",
            Instruction::SyncWrite => "SYNC_WRITE",
            Instruction::BulkRead => "BULK_READ",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Byte helpers ───────────────────────────────────────────────────

/// Checksum over `id ..= last parameter`.
#[inline]
pub fn checksum(body: &[u8]) -> u8 {
    !body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Verify the checksum of a complete frame whose declared length matches its size.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < FRAME_OVERHEAD || frame[0] != 0xFF || frame[1] != 0xFF {
        return false;
    }
    let total = frame[LENGTH] as usize + 4;
    if total != frame.len() {
        return false;
    }
    checksum(&frame[ID..total - 1]) == frame[total - 1]
}

#[inline]
pub const fn make_word(low: u8, high: u8) -> u16 {
    (low as u16) | ((high as u16) << 8)
}

#[inline]
pub const fn low_byte(word: u16) -> u8 {
    (word & 0xFF) as u8
}

#[inline]
pub const fn high_byte(word: u16) -> u8 {
    (word >> 8) as u8
}

/// Offset of the first packet header in `buf`.
///
/// A header is two consecutive `0xFF` bytes. A single trailing `0xFF` counts
/// as the possible start of a header split across reads. Returns `buf.len()`
/// when nothing in the buffer can start a packet.
pub fn find_header(buf: &[u8]) -> usize {
    if let Some(pos) = buf.windows(2).position(|w| w == [0xFF, 0xFF]) {
        return pos;
    }
    match buf.last() {
        Some(0xFF) => buf.len() - 1,
        _ => buf.len(),
    }
}

/// Lowercase space-separated hex, for trace logs.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// ─── Outgoing packets ───────────────────────────────────────────────

/// Instruction packet under construction.
///
/// Backed by a fixed-capacity buffer so the motion cycle never allocates.
/// Overflowing the buffer is remembered and reported as
/// [`CommError::TxCorrupt`] by [`TxPacket::finish`].
#[derive(Debug, Clone)]
pub struct TxPacket {
    buf: heapless::Vec<u8, MAX_TX_FRAME>,
    overflow: bool,
    finished: bool,
}

impl TxPacket {
    pub fn new(id: u8, instruction: Instruction) -> Self {
        let mut buf = heapless::Vec::new();
        // Capacity is far above the five header bytes.
        let _ = buf.extend_from_slice(&[0xFF, 0xFF, id, 0, instruction as u8]);
        Self {
            buf,
            overflow: false,
            finished: false,
        }
    }

    pub fn id(&self) -> u8 {
        self.buf[ID]
    }

    pub fn instruction(&self) -> Option<Instruction> {
        Instruction::from_byte(self.buf[INSTRUCTION])
    }

    /// Number of parameter bytes pushed so far.
    pub fn param_len(&self) -> usize {
        self.buf.len() - PARAMETER - usize::from(self.finished)
    }

    pub fn push(&mut self, byte: u8) -> &mut Self {
        self.reopen();
        if self.buf.push(byte).is_err() {
            self.overflow = true;
        }
        self
    }

    pub fn push_word(&mut self, word: u16) -> &mut Self {
        self.push(low_byte(word)).push(high_byte(word))
    }

    pub fn extend(&mut self, bytes: &[u8]) -> &mut Self {
        self.reopen();
        if self.buf.extend_from_slice(bytes).is_err() {
            self.overflow = true;
        }
        self
    }

    /// Fill in the length and checksum and return the frame bytes.
    ///
    /// Can be called again after more parameters are pushed.
    pub fn finish(&mut self) -> Result<&[u8], CommError> {
        self.reopen();
        let length = self.param_len() + 2;
        if self.overflow || length > u8::MAX as usize || length + 4 >= MAX_TX_FRAME {
            return Err(CommError::TxCorrupt);
        }
        self.buf[LENGTH] = length as u8;
        let sum = checksum(&self.buf[ID..]);
        self.buf.push(sum).map_err(|_| CommError::TxCorrupt)?;
        self.finished = true;
        Ok(self.buf.as_slice())
    }

    /// Drop the checksum appended by an earlier `finish`.
    fn reopen(&mut self) {
        if self.finished {
            self.buf.pop();
            self.finished = false;
        }
    }

    /// Frame bytes as last finished.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}
