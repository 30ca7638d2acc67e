//! Protocol engine tests against the simulated bus and scripted links.
//!
//! Covers reassembly under garbage, chunking, corruption and silence, plus
//! the bulk read path the motion loop depends on.

use bold_cm730::packet::{self, Instruction};
use bold_cm730::registers::cm730::Cm730Register;
use bold_cm730::registers::mx28::Mx28Register;
use bold_cm730::{
    BulkRead, Cm730, Cm730Snapshot, CommError, LinkError, Mx28Alarm, Mx28Snapshot, SerialLink,
    SimHandle, SimulatedBus, StaticMx28State,
};
use bold_common::consts::CM730_ID;
use bold_common::joint::JointId;
use std::collections::VecDeque;
use std::time::Duration;

fn powered_engine() -> (Cm730, SimHandle) {
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let mut cm = Cm730::new(Box::new(bus));
    cm.connect().expect("connect");
    (cm, sim)
}

/// Link that accepts a fixed number of bytes per write and replays a
/// scripted response.
struct ScriptedLink {
    accept: Option<usize>,
    response: VecDeque<u8>,
    writes: usize,
}

impl ScriptedLink {
    fn new(response: &[u8]) -> Self {
        Self {
            accept: None,
            response: response.iter().copied().collect(),
            writes: 0,
        }
    }
}

impl SerialLink for ScriptedLink {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        self.writes += 1;
        Ok(self.accept.unwrap_or(bytes.len()).min(bytes.len()))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let n = buf.len().min(self.response.len()).min(1);
        for slot in buf.iter_mut().take(n) {
            if let Some(byte) = self.response.pop_front() {
                *slot = byte;
            }
        }
        Ok(n)
    }

    fn set_baud_rate(&mut self, _baud: u32) -> Result<(), LinkError> {
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        1_000_000
    }

    fn sleep(&mut self, _duration: Duration) {}
}

fn status_packet(id: u8, error: u8, params: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xFF, 0xFF, id, params.len() as u8 + 2, error];
    frame.extend_from_slice(params);
    frame.push(packet::checksum(&frame[2..]));
    frame
}

// ─── Single exchanges ───────────────────────────────────────────────

#[test]
fn test_garbage_prefix_is_skipped() {
    for garbage in [&[][..], &[0x42][..], &[0x00, 0x13, 0xFF, 0x27, 0x80][..]] {
        let (mut cm, sim) = powered_engine();
        sim.set_word(9, Mx28Register::PresentPositionL, 3000);
        sim.inject_garbage(garbage);
        let reply = cm.read_word(9, Mx28Register::PresentPositionL);
        assert_eq!(reply.map(|r| r.value), Ok(3000), "garbage {garbage:02X?}");
    }
}

#[test]
fn test_corrupted_checksum_reports_rx_corrupt() {
    let (mut cm, sim) = powered_engine();
    sim.corrupt_next_reply();
    assert_eq!(cm.read_byte(4, Mx28Register::Id), Err(CommError::RxCorrupt));
    // The next exchange is clean again.
    assert_eq!(cm.read_byte(4, Mx28Register::Id).map(|r| r.value), Ok(4));
}

#[test]
fn test_silent_device_times_out() {
    let (mut cm, sim) = powered_engine();
    sim.set_silent(true);
    assert_eq!(cm.ping(CM730_ID), Err(CommError::RxTimeout));
    sim.set_silent(false);
    assert_eq!(cm.ping(CM730_ID), Ok(Mx28Alarm::empty()));
}

#[test]
fn test_chunked_delivery_reassembles() {
    let (mut cm, sim) = powered_engine();
    sim.set_max_chunk(3);
    sim.set_word(CM730_ID, Cm730Register::GyroXL, 700);
    let reply = cm.read_word(CM730_ID, Cm730Register::GyroXL).unwrap();
    assert_eq!(reply.value, 700);
}

#[test]
fn test_truncated_response_is_corrupt() {
    let full = status_packet(3, 0, &[0x10, 0x02]);
    let mut cm = Cm730::new(Box::new(ScriptedLink::new(&full[..5])));
    assert_eq!(cm.read_word(3, 30u8), Err(CommError::RxCorrupt));
}

#[test]
fn test_short_write_is_tx_fail() {
    let mut link = ScriptedLink::new(&status_packet(1, 0, &[]));
    link.accept = Some(3);
    let mut cm = Cm730::new(Box::new(link));
    assert_eq!(cm.ping(1), Err(CommError::TxFail));
    assert_eq!(cm.tx_bytes(), 3);
}

#[test]
fn test_status_from_other_device_rejected() {
    let link = ScriptedLink::new(&status_packet(2, 0, &[]));
    let mut cm = Cm730::new(Box::new(link));
    assert_eq!(cm.ping(1), Err(CommError::RxCorrupt));
}

#[test]
fn test_alarm_byte_surfaces_on_read() {
    let link = ScriptedLink::new(&status_packet(6, Mx28Alarm::OVERLOAD.bits(), &[0x33]));
    let mut cm = Cm730::new(Box::new(link));
    let reply = cm.read_byte(6, Mx28Register::PresentTemperature).unwrap();
    assert_eq!(reply.value, 0x33);
    assert_eq!(reply.alarm, Mx28Alarm::OVERLOAD);
}

#[test]
fn test_oversized_sync_write_is_tx_corrupt() {
    let (mut cm, sim) = powered_engine();
    let payload = vec![0u8; 255];
    assert_eq!(cm.sync_write(30, 5, 51, &payload), Err(CommError::TxCorrupt));
    assert_eq!(sim.instruction_count(Instruction::SyncWrite), 0);
}

// ─── Power and torque ───────────────────────────────────────────────

#[test]
fn test_power_cycle() {
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let mut cm = Cm730::new(Box::new(bus));

    assert_eq!(cm.is_power_enabled(), Ok(false));
    assert_eq!(cm.ping(JointId::HEAD_PAN.id()), Err(CommError::RxTimeout));

    cm.power_enable(true).unwrap();
    assert!(sim.is_powered());
    assert_eq!(cm.ping(JointId::HEAD_PAN.id()), Ok(Mx28Alarm::empty()));

    cm.power_enable(false).unwrap();
    assert_eq!(cm.is_power_enabled(), Ok(false));
}

#[test]
fn test_torque_enable_moves_present_to_goal() {
    let (mut cm, sim) = powered_engine();
    assert!(cm.torque_enable(true));
    cm.write_word(12, Mx28Register::GoalPositionL, 1500).unwrap();
    assert_eq!(sim.word(12, Mx28Register::PresentPositionL), 1500);
}

// ─── Bulk read ──────────────────────────────────────────────────────

#[test]
fn test_bulk_read_populates_every_table() {
    let (mut cm, sim) = powered_engine();
    for joint in JointId::all() {
        sim.set_word(joint.id(), Mx28Register::PresentPositionL, 2000 + joint.id() as u16);
    }
    let mut bulk = BulkRead::dynamic();
    cm.bulk_read(&mut bulk).unwrap();

    assert!(bulk.is_complete());
    assert_eq!(bulk.responded(), 21);
    assert_eq!(bulk.error(), Some(Mx28Alarm::empty()));

    let cm730 = Cm730Snapshot::from_table(bulk.cm730()).unwrap();
    assert!(cm730.is_powered);
    for joint in JointId::all() {
        let snap = Mx28Snapshot::from_table(joint.id(), bulk.joint(joint)).unwrap();
        assert_eq!(snap.present_position_value, 2000 + joint.id() as u16);
    }
    assert_eq!(sim.instruction_count(Instruction::BulkRead), 1);
}

#[test]
fn test_bulk_read_with_garbage_and_chunks() {
    let (mut cm, sim) = powered_engine();
    sim.inject_garbage(&[0x01, 0x02, 0x03, 0x04, 0x05]);
    sim.set_max_chunk(7);
    let mut bulk = BulkRead::dynamic();
    assert_eq!(cm.bulk_read(&mut bulk), Ok(()));
    assert!(bulk.is_complete());
}

#[test]
fn test_bulk_read_ors_alarms() {
    let (mut cm, sim) = powered_engine();
    sim.set_alarm(3, Mx28Alarm::OVERHEATING);
    sim.set_alarm(17, Mx28Alarm::OVERLOAD);
    let mut bulk = BulkRead::dynamic();
    cm.bulk_read(&mut bulk).unwrap();
    assert_eq!(bulk.error(), Some(Mx28Alarm::OVERHEATING | Mx28Alarm::OVERLOAD));
    assert_eq!(bulk.joint(JointId::new(17).unwrap()).alarm(), Mx28Alarm::OVERLOAD);
}

#[test]
fn test_bulk_read_corrupt_packet_keeps_others() {
    let (mut cm, sim) = powered_engine();
    sim.corrupt_next_reply();
    let mut bulk = BulkRead::dynamic();
    assert_eq!(cm.bulk_read(&mut bulk), Err(CommError::RxCorrupt));
    assert_eq!(bulk.responded(), 20);
    assert!(bulk.table(CM730_ID).is_some());
}

#[test]
fn test_bulk_read_unpowered_actuators() {
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    sim.set_word(CM730_ID, Cm730Register::GyroXL, 700);
    let mut cm = Cm730::new(Box::new(bus));
    let mut bulk = BulkRead::dynamic();
    // Only the CM730 answers; its packet is still delivered.
    assert_eq!(cm.bulk_read(&mut bulk), Err(CommError::RxCorrupt));
    assert!(!bulk.is_complete());
    assert_eq!(bulk.responded(), 1);
    let cm730 = Cm730Snapshot::from_table(bulk.cm730()).unwrap();
    assert_eq!(cm730.gyro_raw[0], 700);
}

#[test]
fn test_static_bulk_read_decodes_settings() {
    let (mut cm, _) = powered_engine();
    let mut bulk = BulkRead::static_state();
    cm.bulk_read(&mut bulk).unwrap();
    let state = StaticMx28State::from_table(bulk.joint(JointId::R_ANKLE_ROLL)).unwrap();
    assert_eq!(state.id, JointId::R_ANKLE_ROLL.id());
    assert_eq!(state.model_number, 0x1D);
}
