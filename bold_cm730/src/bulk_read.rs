//! Bulk read requests.
//!
//! One BULK_READ instruction asks the CM730 for one register window and
//! every actuator for another. Each device answers with its own status
//! packet, in request order. A [`BulkRead`] owns the pre-built instruction
//! frame, the expected response length and the 21 device tables the
//! responses land in.
//!
//! ## Request layout
//!
//! ```text
//! params: 0x00, [len, 200, start], [len, 1, start], ... [len, 20, start]
//! ```

use crate::packet::{FRAME_OVERHEAD, Instruction, PARAMETER, TxPacket};
use crate::registers::alarm::Mx28Alarm;
use crate::registers::cm730::Cm730Register;
use crate::registers::mx28::Mx28Register;
use crate::table::{DeviceRegisterTable, TABLE_SIZE};
use bold_common::consts::{BROADCAST_ID, CM730_ID, DEVICE_COUNT, MAX_RX_PARAMS};
use bold_common::joint::JointId;
use static_assertions::const_assert;
use std::ops::RangeInclusive;
use tracing::warn;

/// Whether a packet walk should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFlow {
    Continue,
    Done,
}

/// Largest possible bulk read response: every device returns a full table.
pub const MAX_BULK_RESPONSE: usize = DEVICE_COUNT * (FRAME_OVERHEAD + TABLE_SIZE);

const_assert!(MAX_BULK_RESPONSE <= 2 * MAX_RX_PARAMS);

/// Pre-built bulk read of the CM730 and all 20 actuators.
#[derive(Debug, Clone)]
pub struct BulkRead {
    frame: Vec<u8>,
    rx_length: usize,
    /// Index 0 is the CM730, index `n` is actuator `n`.
    tables: Vec<DeviceRegisterTable>,
    seen: u32,
    error: Option<Mx28Alarm>,
}

const ALL_SEEN: u32 = (1 << DEVICE_COUNT) - 1;

impl BulkRead {
    /// Build a request for `cm` on the CM730 and `mx` on every actuator.
    ///
    /// # Panics
    /// Panics if either window is empty or runs past its control table.
    pub fn new(cm: RangeInclusive<u8>, mx: RangeInclusive<u8>) -> Self {
        assert!(cm.start() <= cm.end(), "empty CM730 window");
        assert!(mx.start() <= mx.end(), "empty MX28 window");
        assert!((*cm.end() as usize) < TABLE_SIZE, "CM730 window past table end");
        assert!((*mx.end() as usize) < TABLE_SIZE, "MX28 window past table end");

        let cm_len = cm.end() - cm.start() + 1;
        let mx_len = mx.end() - mx.start() + 1;

        let mut packet = TxPacket::new(BROADCAST_ID, Instruction::BulkRead);
        packet.push(0x00);
        packet.extend(&[cm_len, CM730_ID, *cm.start()]);
        let mut tables = Vec::with_capacity(DEVICE_COUNT);
        tables.push(DeviceRegisterTable::new(*cm.start(), cm_len));
        for joint in JointId::all() {
            packet.extend(&[mx_len, joint.id(), *mx.start()]);
            tables.push(DeviceRegisterTable::new(*mx.start(), mx_len));
        }
        // 64 parameter bytes, well inside the frame limit.
        let frame = packet.finish().map(<[u8]>::to_vec).unwrap_or_default();

        let rx_length =
            DEVICE_COUNT * FRAME_OVERHEAD + cm_len as usize + mx_len as usize * (DEVICE_COUNT - 1);

        Self {
            frame,
            rx_length,
            tables,
            seen: 0,
            error: None,
        }
    }

    /// Fast-changing registers, read every motion cycle.
    ///
    /// CM730 `DXL_POWER..=VOLTAGE`, MX28 `PRESENT_POSITION_L..=PRESENT_TEMPERATURE`.
    pub fn dynamic() -> Self {
        Self::new(
            Cm730Register::DxlPower.address()..=Cm730Register::Voltage.address(),
            Mx28Register::PresentPositionL.address()..=Mx28Register::PresentTemperature.address(),
        )
    }

    /// Identity and settings, read at startup and on request.
    ///
    /// CM730 `MODEL_NUMBER_L..=RETURN_LEVEL`, MX28 `MODEL_NUMBER_L..=LOCK`.
    pub fn static_state() -> Self {
        Self::new(
            Cm730Register::ModelNumberL.address()..=Cm730Register::ReturnLevel.address(),
            Mx28Register::ModelNumberL.address()..=Mx28Register::Lock.address(),
        )
    }

    /// Instruction frame bytes.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Expected number of response bytes from all devices.
    pub fn rx_length(&self) -> usize {
        self.rx_length
    }

    pub fn cm730(&self) -> &DeviceRegisterTable {
        &self.tables[0]
    }

    pub fn joint(&self, joint: JointId) -> &DeviceRegisterTable {
        &self.tables[joint.id() as usize]
    }

    /// Table of a bus device id, if it takes part in the bulk read.
    pub fn table(&self, id: u8) -> Option<&DeviceRegisterTable> {
        Self::slot(id).map(|i| &self.tables[i])
    }

    /// OR of the error bytes of every response in the last exchange.
    ///
    /// `None` until a response arrives.
    pub fn error(&self) -> Option<Mx28Alarm> {
        self.error
    }

    /// True once every device answered in the last exchange.
    pub fn is_complete(&self) -> bool {
        self.seen == ALL_SEEN
    }

    /// Number of devices that answered in the last exchange.
    pub fn responded(&self) -> u32 {
        self.seen.count_ones()
    }

    fn slot(id: u8) -> Option<usize> {
        match id {
            CM730_ID => Some(0),
            _ => JointId::new(id).map(|j| j.id() as usize),
        }
    }

    /// Reset per-exchange bookkeeping before transmitting.
    pub(crate) fn begin(&mut self) {
        self.seen = 0;
        self.error = None;
    }

    /// Copy one validated status packet into its device table.
    pub(crate) fn accept(&mut self, packet: &[u8]) -> PacketFlow {
        let id = packet[2];
        let Some(slot) = Self::slot(id) else {
            warn!(id, "bulk read response from unexpected device");
            return PacketFlow::Continue;
        };
        let alarm = Mx28Alarm::from_bits_truncate(packet[4]);
        let payload = &packet[PARAMETER..packet.len() - 1];
        if payload.len() != self.tables[slot].length() as usize {
            // Counted as missing, so the exchange ends in RxCorrupt.
            warn!(
                id,
                got = payload.len(),
                expected = self.tables[slot].length(),
                "bulk read response length mismatch"
            );
            return PacketFlow::Continue;
        }
        self.tables[slot].fill(payload, alarm);
        self.error = Some(self.error.unwrap_or_default() | alarm);
        self.seen |= 1 << slot;

        if self.is_complete() {
            PacketFlow::Done
        } else {
            PacketFlow::Continue
        }
    }
}
