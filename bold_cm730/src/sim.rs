//! Wire-level simulated bus.
//!
//! [`SimulatedBus`] implements [`SerialLink`] by decoding the instruction
//! frames written to it and answering from in-memory control tables, exactly
//! as a CM730 with 20 MX28s would. No hardware is needed, and the protocol
//! engine runs unmodified on top of it.
//!
//! # Behaviour
//!
//! - Actuators only answer while the CM730 `DXL_POWER` register is 1.
//! - Goal position writes are mirrored to present position while torque is on.
//! - Broadcast instructions and SYNC_WRITE never produce a response.
//!
//! # Fault injection
//!
//! A [`SimHandle`] (cheap to clone, shareable with a test while the bus is
//! owned by the motion loop) can prepend garbage to the next response,
//! corrupt the next status packet, silence the bus, deliver responses in
//! small chunks and set per-device alarm bytes.

use crate::error::LinkError;
use crate::link::SerialLink;
use crate::packet::{self, FRAME_OVERHEAD, ID, INSTRUCTION, Instruction, LENGTH, PARAMETER};
use crate::registers::alarm::Mx28Alarm;
use crate::registers::cm730::{self, Cm730Register as Cm};
use crate::registers::mx28::{self, Mx28Register as Mx};
use bold_common::consts::{BROADCAST_ID, CM730_ID, DEFAULT_BAUD_RATE, DEVICE_COUNT};
use bold_common::joint::JointId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const CM730_MODEL: u16 = 0x7300;
const MX28_MODEL: u16 = 0x001D;

fn cm730_defaults() -> Vec<u8> {
    let mut mem = vec![0u8; cm730::MAXNUM_ADDRESS];
    set_word(&mut mem, Cm::ModelNumberL.address(), CM730_MODEL);
    mem[Cm::Version as usize] = 0x11;
    mem[Cm::Id as usize] = CM730_ID;
    mem[Cm::BaudRate as usize] = 1;
    mem[Cm::ReturnLevel as usize] = 2;
    for reg in [
        Cm::GyroZL,
        Cm::GyroYL,
        Cm::GyroXL,
        Cm::AccelXL,
        Cm::AccelYL,
        Cm::AccelZL,
    ] {
        set_word(&mut mem, reg.address(), cm730::IMU_VALUE_MID as u16);
    }
    mem[Cm::Voltage as usize] = 123;
    mem
}

fn mx28_defaults(id: u8) -> Vec<u8> {
    let mut mem = vec![0u8; mx28::MAXNUM_ADDRESS];
    set_word(&mut mem, Mx::ModelNumberL.address(), MX28_MODEL);
    mem[Mx::Version as usize] = 30;
    mem[Mx::Id as usize] = id;
    mem[Mx::BaudRate as usize] = 1;
    set_word(&mut mem, Mx::CcwAngleLimitL.address(), mx28::MAX_VALUE);
    mem[Mx::HighLimitTemperature as usize] = 80;
    mem[Mx::LowLimitVoltage as usize] = 60;
    mem[Mx::HighLimitVoltage as usize] = 160;
    set_word(&mut mem, Mx::MaxTorqueL.address(), 0x3FF);
    mem[Mx::ReturnLevel as usize] = 2;
    mem[Mx::AlarmLed as usize] = 0x24;
    mem[Mx::AlarmShutdown as usize] = 0x24;
    mem[Mx::PGain as usize] = 32;
    set_word(&mut mem, Mx::GoalPositionL.address(), mx28::CENTER_VALUE);
    set_word(&mut mem, Mx::TorqueLimitL.address(), 0x3FF);
    set_word(&mut mem, Mx::PresentPositionL.address(), mx28::CENTER_VALUE);
    mem[Mx::PresentVoltage as usize] = 120;
    mem[Mx::PresentTemperature as usize] = 40;
    set_word(&mut mem, Mx::PunchL.address(), 32);
    mem
}

fn set_word(mem: &mut [u8], address: u8, value: u16) {
    mem[address as usize] = packet::low_byte(value);
    mem[address as usize + 1] = packet::high_byte(value);
}

/// Memory slot of a device id. 0 is the CM730, `n` is actuator `n`.
fn slot(id: u8) -> Option<usize> {
    match id {
        CM730_ID => Some(0),
        _ => JointId::new(id).map(|j| j.id() as usize),
    }
}

#[derive(Debug)]
struct SimState {
    /// Index 0: CM730, `n`: actuator `n`.
    memory: Vec<Vec<u8>>,
    alarms: [Mx28Alarm; DEVICE_COUNT],
    /// Bytes written by the host not yet decoded.
    inbound: Vec<u8>,
    /// Response bytes waiting to be read by the host.
    outbound: VecDeque<u8>,
    garbage: Vec<u8>,
    corrupt_next: bool,
    silent: bool,
    max_chunk: usize,
    instructions: HashMap<u8, usize>,
    last_sync_write: Option<Vec<u8>>,
}

impl SimState {
    fn new() -> Self {
        let mut memory = Vec::with_capacity(DEVICE_COUNT);
        memory.push(cm730_defaults());
        for joint in JointId::all() {
            memory.push(mx28_defaults(joint.id()));
        }
        Self {
            memory,
            alarms: [Mx28Alarm::empty(); DEVICE_COUNT],
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            garbage: Vec::new(),
            corrupt_next: false,
            silent: false,
            max_chunk: usize::MAX,
            instructions: HashMap::new(),
            last_sync_write: None,
        }
    }

    fn powered(&self) -> bool {
        self.memory[0][Cm::DxlPower as usize] == 1
    }

    fn responds(&self, id: u8) -> bool {
        !self.silent && (id == CM730_ID || (JointId::new(id).is_some() && self.powered()))
    }

    /// Decode every complete frame in the inbound buffer.
    fn process_inbound(&mut self) {
        loop {
            let start = packet::find_header(&self.inbound);
            self.inbound.drain(..start);
            if self.inbound.len() < FRAME_OVERHEAD {
                return;
            }
            let total = self.inbound[LENGTH] as usize + 4;
            if self.inbound.len() < total {
                return;
            }
            let frame: Vec<u8> = self.inbound.drain(..total).collect();
            if packet::verify(&frame) {
                self.execute(&frame);
            } else {
                debug!(frame = %packet::hex(&frame), "simulated bus dropped bad frame");
            }
        }
    }

    fn execute(&mut self, frame: &[u8]) {
        let id = frame[ID];
        let params = &frame[PARAMETER..frame.len() - 1];
        *self.instructions.entry(frame[INSTRUCTION]).or_default() += 1;
        let Some(instruction) = Instruction::from_byte(frame[INSTRUCTION]) else {
            return;
        };
        trace!(id, %instruction, "simulated bus received");

        match instruction {
            Instruction::Ping => self.reply(id, &[]),
            Instruction::Read if params.len() >= 2 => {
                if let Some(data) = self.read_memory(id, params[0], params[1]) {
                    self.reply(id, &data);
                }
            }
            Instruction::Write if !params.is_empty() => {
                if id == BROADCAST_ID {
                    for target in std::iter::once(CM730_ID).chain(JointId::all().map(JointId::id)) {
                        self.write_memory(target, params[0], &params[1..]);
                    }
                } else {
                    self.write_memory(id, params[0], &params[1..]);
                    self.reply(id, &[]);
                }
            }
            Instruction::SyncWrite if params.len() >= 2 => {
                self.last_sync_write = Some(frame.to_vec());
                let from = params[0];
                let record = params[1] as usize + 1;
                for chunk in params[2..].chunks_exact(record) {
                    self.write_memory(chunk[0], from, &chunk[1..]);
                }
            }
            Instruction::BulkRead if !params.is_empty() => {
                for request in params[1..].chunks_exact(3) {
                    let (length, target, start) = (request[0], request[1], request[2]);
                    if let Some(data) = self.read_memory(target, start, length) {
                        self.reply(target, &data);
                    }
                }
            }
            Instruction::Reset => {
                if let Some(s) = slot(id) {
                    self.memory[s] = if s == 0 {
                        cm730_defaults()
                    } else {
                        mx28_defaults(id)
                    };
                    self.reply(id, &[]);
                }
            }
            _ => {}
        }
    }

    fn read_memory(&self, id: u8, start: u8, length: u8) -> Option<Vec<u8>> {
        let s = slot(id)?;
        if !self.responds(id) {
            return None;
        }
        let mem = &self.memory[s];
        let start = start as usize;
        let end = (start + length as usize).min(mem.len());
        Some(mem.get(start..end).map(<[u8]>::to_vec).unwrap_or_default())
    }

    fn write_memory(&mut self, id: u8, start: u8, data: &[u8]) {
        let Some(s) = slot(id) else { return };
        if !self.responds(id) {
            return;
        }
        let mem = &mut self.memory[s];
        let start = start as usize;
        let end = (start + data.len()).min(mem.len());
        if start < end {
            mem[start..end].copy_from_slice(&data[..end - start]);
        }
        if s > 0 && mem[Mx::TorqueEnable as usize] != 0 {
            let goal = Mx::GoalPositionL as usize;
            let present = Mx::PresentPositionL as usize;
            mem[present] = mem[goal];
            mem[present + 1] = mem[goal + 1];
        }
    }

    /// Queue a status packet unless the device is silent or addressed by broadcast.
    fn reply(&mut self, id: u8, data: &[u8]) {
        if id == BROADCAST_ID || !self.responds(id) {
            return;
        }
        let Some(s) = slot(id) else { return };

        let mut frame = Vec::with_capacity(data.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&[0xFF, 0xFF, id, (data.len() + 2) as u8]);
        frame.push(self.alarms[s].bits());
        frame.extend_from_slice(data);
        frame.push(packet::checksum(&frame[ID..]));

        if self.corrupt_next {
            self.corrupt_next = false;
            let i = if data.is_empty() { INSTRUCTION } else { PARAMETER };
            frame[i] ^= 0x5A;
        }

        self.outbound.extend(self.garbage.drain(..));
        self.outbound.extend(frame);
    }
}

/// In-memory CM730 + 20 MX28 bus.
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
    baud: u32,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::with_baud(DEFAULT_BAUD_RATE)
    }

    pub fn with_baud(baud: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            baud,
        }
    }

    /// Handle for inspecting and disturbing the bus from another owner.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink for SimulatedBus {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.state.lock().outbound.clear();
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let mut state = self.state.lock();
        state.inbound.extend_from_slice(bytes);
        state.process_inbound();
        Ok(bytes.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut state = self.state.lock();
        let n = buf.len().min(state.outbound.len()).min(state.max_chunk);
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        if baud == 0 {
            return Err(LinkError::UnsupportedBaud(baud));
        }
        self.baud = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn sleep(&mut self, _duration: Duration) {}
}

/// Shared access to a [`SimulatedBus`].
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Raw control table byte of a device. 0 for unknown ids or addresses.
    pub fn register(&self, id: u8, address: impl Into<u8>) -> u8 {
        let state = self.state.lock();
        slot(id)
            .and_then(|s| state.memory[s].get(address.into() as usize).copied())
            .unwrap_or(0)
    }

    /// Raw little-endian word of a device.
    pub fn word(&self, id: u8, address: impl Into<u8>) -> u16 {
        let address = address.into();
        packet::make_word(
            self.register(id, address),
            self.register(id, address.wrapping_add(1)),
        )
    }

    /// Overwrite a control table byte, bypassing power and side effects.
    pub fn set_register(&self, id: u8, address: impl Into<u8>, value: u8) {
        let mut state = self.state.lock();
        if let Some(s) = slot(id) {
            if let Some(b) = state.memory[s].get_mut(address.into() as usize) {
                *b = value;
            }
        }
    }

    pub fn set_word(&self, id: u8, address: impl Into<u8>, value: u16) {
        let address = address.into();
        self.set_register(id, address, packet::low_byte(value));
        self.set_register(id, address.wrapping_add(1), packet::high_byte(value));
    }

    /// Error byte reported in every status packet from `id`.
    pub fn set_alarm(&self, id: u8, alarm: Mx28Alarm) {
        if let Some(s) = slot(id) {
            self.state.lock().alarms[s] = alarm;
        }
    }

    /// Prepend these bytes to the next response.
    pub fn inject_garbage(&self, bytes: &[u8]) {
        self.state.lock().garbage.extend_from_slice(bytes);
    }

    /// Flip a byte in the next status packet so its checksum fails.
    pub fn corrupt_next_reply(&self) {
        self.state.lock().corrupt_next = true;
    }

    /// Stop every device from answering, as if the cable were pulled.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Deliver at most `n` bytes per read.
    pub fn set_max_chunk(&self, n: usize) {
        self.state.lock().max_chunk = n.max(1);
    }

    pub fn is_powered(&self) -> bool {
        self.state.lock().powered()
    }

    /// Number of frames received with this instruction.
    pub fn instruction_count(&self, instruction: Instruction) -> usize {
        self.state
            .lock()
            .instructions
            .get(&(instruction as u8))
            .copied()
            .unwrap_or(0)
    }

    /// Frame of the most recent SYNC_WRITE.
    pub fn last_sync_write(&self) -> Option<Vec<u8>> {
        self.state.lock().last_sync_write.clone()
    }
}
