//! CM730 protocol engine.
//!
//! Frames instruction packets, writes them to a [`SerialLink`] and
//! reassembles the status packets that come back. Every call is synchronous,
//! blocks the caller for at most one packet window, and never retries.
//!
//! ## Reassembly
//!
//! Responses are read into a buffer sized to the expected byte count until it
//! is full or the packet window closes. Once full, the buffer is aligned on
//! the first `FF FF` header; leading garbage is shifted out and the freed
//! space refilled from the link. The aligned buffer is then walked packet by
//! packet: each declared length must fit in what remains, each checksum must
//! match, and each packet is handed to a callback that decides whether more
//! packets are expected.
//!
//! ## Timeouts
//!
//! `byte_transfer_ms = 1000 / baud * 12` and a window for `n` bytes is
//! `byte_transfer_ms * n + 5` ms. Bulk reads stretch `n` by 1.5 because
//! latency compounds over 21 devices.

use crate::bulk_read::{BulkRead, MAX_BULK_RESPONSE, PacketFlow};
use crate::error::{CommError, LinkError};
use crate::link::SerialLink;
use crate::packet::{
    self, ERROR, FRAME_OVERHEAD, ID, Instruction, LENGTH, MAX_TX_FRAME, PARAMETER, TxPacket,
};
use crate::registers::alarm::Mx28Alarm;
use crate::registers::cm730::{self, Cm730Register};
use crate::registers::mx28::Mx28Register;
use bold_common::consts::{BROADCAST_ID, CM730_ID, DXL_INBOUND_BUFFER, MAX_RX_PARAMS};
use bold_common::joint::JointId;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

const RX_BUFFER_SIZE: usize = if MAX_BULK_RESPONSE > MAX_RX_PARAMS + FRAME_OVERHEAD {
    MAX_BULK_RESPONSE
} else {
    MAX_RX_PARAMS + FRAME_OVERHEAD
};

/// Fixed margin added to every packet window [ms].
const PACKET_MARGIN_MS: f64 = 5.0;

/// Settle time after switching actuator power.
const POWER_SETTLE: Duration = Duration::from_millis(300);

/// Value read from a device plus the alarm byte of its status packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<T> {
    pub value: T,
    pub alarm: Mx28Alarm,
}

/// Protocol engine bound to one link.
pub struct Cm730 {
    link: Box<dyn SerialLink>,
    byte_transfer_ms: f64,
    rx: Vec<u8>,
    rx_bytes: u64,
    tx_bytes: u64,
}

impl Cm730 {
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        let byte_transfer_ms = byte_transfer_ms(link.baud_rate());
        Self {
            link,
            byte_transfer_ms,
            rx: vec![0; RX_BUFFER_SIZE],
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    /// Name of the underlying link backend.
    pub fn link_name(&self) -> &'static str {
        self.link.name()
    }

    // ─── Session ────────────────────────────────────────────────────

    /// Enable actuator power.
    pub fn connect(&mut self) -> Result<(), CommError> {
        info!(link = self.link.name(), "connecting to CM730");
        self.power_enable(true)
    }

    /// Green head LED, eyes and panel off, actuator power off.
    ///
    /// Every step is attempted. Returns false if any failed.
    pub fn disconnect(&mut self) -> bool {
        let head = self.write_word(
            CM730_ID,
            Cm730Register::LedHeadL,
            cm730::color_to_value(0, 255, 0),
        );
        let eye = self.write_word(CM730_ID, Cm730Register::LedEyeL, 0);
        let panel = self.write_byte(CM730_ID, Cm730Register::LedPanel, 0);
        let power = self.power_enable(false);
        info!("disconnected from CM730");
        head.is_ok() && eye.is_ok() && panel.is_ok() && power.is_ok()
    }

    /// Switch the link to `2_000_000 / (baud_number + 1)` bit/s.
    pub fn change_baud(&mut self, baud_number: u8) -> Result<u32, LinkError> {
        let baud = 2_000_000 / (baud_number as u32 + 1);
        self.link.set_baud_rate(baud)?;
        self.byte_transfer_ms = byte_transfer_ms(baud);
        info!(baud, "link baud rate changed");
        Ok(baud)
    }

    /// Switch the actuator power rail, then wait for it to settle.
    pub fn power_enable(&mut self, enable: bool) -> Result<(), CommError> {
        let result = self
            .write_byte(CM730_ID, Cm730Register::DxlPower, u8::from(enable))
            .map(|_| ());
        match result {
            Ok(()) => info!(enable, "DXL power switched"),
            Err(e) => warn!(enable, error = %e, "DXL power switch failed"),
        }
        self.link.sleep(POWER_SETTLE);
        result
    }

    pub fn is_power_enabled(&mut self) -> Result<bool, CommError> {
        self.read_byte(CM730_ID, Cm730Register::DxlPower)
            .map(|r| r.value == 1)
    }

    /// Enable or disable torque on every joint.
    ///
    /// Continues past failures. Returns true only if every write succeeded.
    pub fn torque_enable(&mut self, enable: bool) -> bool {
        let mut all_ok = true;
        for joint in JointId::all() {
            if let Err(e) = self.write_byte(joint.id(), Mx28Register::TorqueEnable, u8::from(enable))
            {
                warn!(joint = %joint, enable, error = %e, "torque enable failed");
                all_ok = false;
            }
        }
        all_ok
    }

    // ─── Byte counters ──────────────────────────────────────────────

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    pub fn reset_byte_counts(&mut self) {
        self.rx_bytes = 0;
        self.tx_bytes = 0;
    }

    // ─── Instructions ───────────────────────────────────────────────

    /// Ping a device. Broadcast pings succeed once written.
    pub fn ping(&mut self, id: u8) -> Result<Mx28Alarm, CommError> {
        let mut packet = TxPacket::new(id, Instruction::Ping);
        self.status_exchange(&mut packet, &mut [])
    }

    /// Restore a device's factory control table.
    pub fn reset(&mut self, id: u8) -> Result<Mx28Alarm, CommError> {
        let mut packet = TxPacket::new(id, Instruction::Reset);
        self.status_exchange(&mut packet, &mut [])
    }

    pub fn read_byte(&mut self, id: u8, address: impl Into<u8>) -> Result<Reply<u8>, CommError> {
        let mut value = [0u8; 1];
        let alarm = self.read_into(id, address.into(), &mut value)?;
        Ok(Reply {
            value: value[0],
            alarm,
        })
    }

    pub fn read_word(&mut self, id: u8, address: impl Into<u8>) -> Result<Reply<u16>, CommError> {
        let mut value = [0u8; 2];
        let alarm = self.read_into(id, address.into(), &mut value)?;
        Ok(Reply {
            value: packet::make_word(value[0], value[1]),
            alarm,
        })
    }

    /// Read `from..=to` into the same addresses of `table`.
    pub fn read_table(
        &mut self,
        id: u8,
        from: u8,
        to: u8,
        table: &mut [u8],
    ) -> Result<Mx28Alarm, CommError> {
        if to < from || to as usize >= table.len() {
            debug!(id, from, to, len = table.len(), "invalid read_table range");
            return Err(CommError::TxCorrupt);
        }
        self.read_into(id, from, &mut table[from as usize..=to as usize])
    }

    pub fn write_byte(
        &mut self,
        id: u8,
        address: impl Into<u8>,
        value: u8,
    ) -> Result<Mx28Alarm, CommError> {
        let mut packet = TxPacket::new(id, Instruction::Write);
        packet.push(address.into()).push(value);
        self.status_exchange(&mut packet, &mut [])
    }

    pub fn write_word(
        &mut self,
        id: u8,
        address: impl Into<u8>,
        value: u16,
    ) -> Result<Mx28Alarm, CommError> {
        let mut packet = TxPacket::new(id, Instruction::Write);
        packet.push(address.into()).push_word(value);
        self.status_exchange(&mut packet, &mut [])
    }

    /// Write the same address range on many devices in one broadcast packet.
    ///
    /// `payload` holds `device_count` records of `bytes_per_device` bytes,
    /// each starting with the device id. No device answers.
    pub fn sync_write(
        &mut self,
        from: u8,
        bytes_per_device: u8,
        device_count: u8,
        payload: &[u8],
    ) -> Result<(), CommError> {
        let size = bytes_per_device as usize * device_count as usize;
        if bytes_per_device == 0 || payload.len() != size {
            debug!(
                bytes_per_device,
                device_count,
                len = payload.len(),
                "sync write payload size mismatch"
            );
            return Err(CommError::TxCorrupt);
        }
        if 8 + size > DXL_INBOUND_BUFFER {
            warn!(
                size = 8 + size,
                limit = DXL_INBOUND_BUFFER,
                "sync write exceeds the actuator inbound buffer"
            );
        }

        let mut packet = TxPacket::new(BROADCAST_ID, Instruction::SyncWrite);
        packet.push(from).push(bytes_per_device - 1).extend(payload);
        let frame = packet.finish()?;
        self.transmit(frame)
    }

    /// Issue a bulk read and reassemble every device's response into its table.
    ///
    /// Tables of devices whose packets arrived intact are updated even when
    /// the exchange as a whole fails.
    pub fn bulk_read(&mut self, request: &mut BulkRead) -> Result<(), CommError> {
        request.begin();
        self.transmit(request.frame())?;
        let expected = request.rx_length();
        let result = self.receive(expected, expected as f64 * 1.5, |p| Ok(request.accept(p)));
        if let Err(e) = result {
            debug!(
                error = %e,
                responded = request.responded(),
                "bulk read incomplete"
            );
        }
        result
    }

    // ─── Exchange internals ─────────────────────────────────────────

    fn read_into(&mut self, id: u8, address: u8, out: &mut [u8]) -> Result<Mx28Alarm, CommError> {
        if id == BROADCAST_ID || out.is_empty() || out.len() > u8::MAX as usize {
            // Broadcast reads get no answer.
            return Err(CommError::TxCorrupt);
        }
        let mut packet = TxPacket::new(id, Instruction::Read);
        packet.push(address).push(out.len() as u8);
        self.status_exchange(&mut packet, out)
    }

    /// Send one instruction and wait for the single status packet carrying
    /// `out.len()` parameter bytes.
    fn status_exchange(
        &mut self,
        packet: &mut TxPacket,
        out: &mut [u8],
    ) -> Result<Mx28Alarm, CommError> {
        let id = packet.id();
        let frame = packet.finish()?;
        self.transmit(frame)?;
        if id == BROADCAST_ID {
            return Ok(Mx28Alarm::empty());
        }

        let expected = out.len() + FRAME_OVERHEAD;
        let mut alarm = Mx28Alarm::empty();
        self.receive(expected, expected as f64, |p| {
            if p[ID] != id {
                debug!(expected = id, got = p[ID], "status packet from another device");
                return Ok(PacketFlow::Continue);
            }
            if p.len() != expected {
                return Err(CommError::RxCorrupt);
            }
            alarm = Mx28Alarm::from_bits_truncate(p[ERROR]);
            out.copy_from_slice(&p[PARAMETER..p.len() - 1]);
            Ok(PacketFlow::Done)
        })?;

        if alarm.has_error() {
            warn!(id, %alarm, "device reports alarm");
        }
        Ok(alarm)
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), CommError> {
        if frame.len() >= MAX_TX_FRAME {
            return Err(CommError::TxCorrupt);
        }
        if let Err(e) = self.link.clear_input() {
            warn!(error = %e, "failed to flush link input");
        }
        trace!(frame = %packet::hex(frame), "tx");

        match self.link.write_bytes(frame) {
            Ok(n) => {
                self.tx_bytes += n as u64;
                if n != frame.len() {
                    warn!(written = n, len = frame.len(), "short write");
                    return Err(CommError::TxFail);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "link write failed");
                Err(CommError::TxFail)
            }
        }
    }

    /// Fill, align and walk `expected` response bytes.
    fn receive<F>(&mut self, expected: usize, wait_bytes: f64, mut on_packet: F) -> Result<(), CommError>
    where
        F: FnMut(&[u8]) -> Result<PacketFlow, CommError>,
    {
        let expected = expected.min(self.rx.len());
        let window = Duration::from_secs_f64(
            (self.byte_transfer_ms * wait_bytes + PACKET_MARGIN_MS) / 1000.0,
        );
        let deadline = Instant::now() + window;
        let mut filled = 0usize;
        let mut received = 0usize;
        let mut short = false;

        // Fill and align on the first header.
        loop {
            if filled == expected {
                let start = packet::find_header(&self.rx[..filled]);
                if start == 0 {
                    break;
                }
                trace!(skipped = start, "discarding bytes before header");
                self.rx.copy_within(start..filled, 0);
                filled -= start;
                continue;
            }

            match self.link.read_bytes(&mut self.rx[filled..expected]) {
                Ok(n) => {
                    filled += n;
                    received += n;
                    self.rx_bytes += n as u64;
                }
                Err(e) => warn!(error = %e, "link read failed"),
            }

            if filled < expected && Instant::now() >= deadline {
                trace!(received, expected, "rx window closed");
                if received == 0 {
                    return Err(CommError::RxTimeout);
                }
                // Still walk what arrived so intact packets are delivered.
                let start = packet::find_header(&self.rx[..filled]);
                self.rx.copy_within(start..filled, 0);
                filled -= start;
                short = true;
                break;
            }
        }

        trace!(rx = %packet::hex(&self.rx[..filled]), "rx");

        // Walk the packets.
        let mut offset = 0usize;
        let mut corrupt = false;
        while filled - offset >= FRAME_OVERHEAD {
            let rest = &self.rx[offset..filled];
            if rest[0] != 0xFF || rest[1] != 0xFF {
                corrupt = true;
                offset += packet::find_header(rest);
                continue;
            }
            let total = rest[LENGTH] as usize + 4;
            if total < FRAME_OVERHEAD || total > rest.len() {
                debug!(total, remaining = rest.len(), "declared length inconsistent");
                corrupt = true;
                offset += 1;
                continue;
            }
            let frame = &rest[..total];
            if !packet::verify(frame) {
                debug!(frame = %packet::hex(frame), "checksum mismatch");
                corrupt = true;
                offset += 1;
                continue;
            }
            match on_packet(frame)? {
                PacketFlow::Done if corrupt || short => return Err(CommError::RxCorrupt),
                PacketFlow::Done => return Ok(()),
                PacketFlow::Continue => offset += total,
            }
        }

        Err(CommError::RxCorrupt)
    }
}

fn byte_transfer_ms(baud: u32) -> f64 {
    1000.0 / baud.max(1) as f64 * 12.0
}
