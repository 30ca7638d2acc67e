//! Integration test: motion loop against the simulated bus.
//!
//! Cycles are stepped synchronously with `MotionLoop::step` except in the
//! threaded start/stop test, which paces on a virtual clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use bold_cm730::packet::Instruction;
use bold_cm730::{LinkError, SerialLink};
use bold_cm730::registers::cm730::{self, Cm730Register};
use bold_cm730::registers::mx28::{self, Mx28Register};
use bold_cm730::{Mx28Alarm, SimHandle, SimulatedBus};
use bold_common::hardware::config::JointConfig;
use bold_common::joint::JointId;
use bold_motion::cycle::VirtualClock;
use bold_motion::state::{BodyControlState, HardwareState, MotionTimingState, StaticHardwareState};
use bold_motion::{
    LoopState, ModuleRegistry, MotionError, MotionLoop, Priority, Scheduler, SectionRequest,
    StateStore,
};

use super::{Pose, test_config};

const NONE: SectionRequest = SectionRequest::NONE;

fn sim_loop(modules: ModuleRegistry) -> (MotionLoop, SimHandle, Arc<StateStore>) {
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let store = Arc::new(StateStore::new());
    let motion = MotionLoop::new(
        &test_config(),
        Some(Box::new(bus)),
        modules,
        Arc::clone(&store),
    );
    (motion, sim, store)
}

fn hardware_cycle(store: &StateStore) -> Option<u64> {
    store.get::<HardwareState>().map(|hw| hw.cycle)
}

// ── Seeding ─────────────────────────────────────────────────────────

#[test]
fn first_cycle_seeds_targets_without_offset() {
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    // Torque enable copies goal to present, so set both.
    sim.set_word(1, Mx28Register::GoalPositionL, 2100);
    sim.set_word(1, Mx28Register::PresentPositionL, 2100);

    let mut config = test_config();
    config.hardware.joints.push(JointConfig {
        joint: JointId::R_SHOULDER_PITCH,
        offset: 4,
        min_degrees: None,
        max_degrees: None,
    });
    let store = Arc::new(StateStore::new());
    let mut motion = MotionLoop::new(
        &config,
        Some(Box::new(bus)),
        ModuleRegistry::new(),
        Arc::clone(&store),
    );

    motion.step().unwrap();
    assert!(motion.motion_cycle().unwrap().has_body());
    let hw = store.get::<HardwareState>().unwrap();
    assert_eq!(hw.cycle, 1);
    assert_eq!(hw.joint(JointId::R_SHOULDER_PITCH).present_position_value, 2100);
    assert!(hw.rx_bytes > 0);

    let body = motion.motion_cycle().unwrap().body();
    assert_eq!(body.joint(JointId::R_SHOULDER_PITCH).value(), 2096);
    assert!(!body.is_dirty());
    assert!(store.get::<StaticHardwareState>().is_some());
    assert!(store.get::<MotionTimingState>().is_some());
}

// ── Module output ───────────────────────────────────────────────────

#[test]
fn assigned_module_targets_reach_the_actuators() {
    let mut modules = ModuleRegistry::new();
    let (pose, steps) = Pose::new(30.0);
    let look = modules.register("look", Box::new(pose));
    let (mut motion, sim, store) = sim_loop(modules);
    let scheduler = Scheduler::new(Arc::clone(&store));

    motion.step().unwrap();
    scheduler.request(&look, SectionRequest::new(Priority::Normal), NONE, NONE);
    scheduler.update();
    assert_eq!(sim.instruction_count(Instruction::SyncWrite), 0);

    motion.step().unwrap();
    assert_eq!(steps.load(Ordering::SeqCst), 1);
    assert_eq!(sim.instruction_count(Instruction::SyncWrite), 1);
    let goal = mx28::degs_to_value(30.0);
    assert_eq!(sim.word(19, Mx28Register::GoalPositionL), goal);
    assert_eq!(sim.word(20, Mx28Register::GoalPositionL), goal);
    // Arms were not assigned.
    assert_eq!(sim.word(1, Mx28Register::GoalPositionL), mx28::CENTER_VALUE);

    let targets = store.get::<BodyControlState>().unwrap();
    assert_eq!(targets.cycle, 2);
    let timing = store.get::<MotionTimingState>().unwrap();
    assert!(timing.steps.iter().any(|s| s.label == "look"));

    // Same pose again: nothing dirty, nothing sent.
    motion.step().unwrap();
    assert_eq!(steps.load(Ordering::SeqCst), 2);
    assert_eq!(sim.instruction_count(Instruction::SyncWrite), 1);
}

#[test]
fn committed_module_completion_reaches_the_scheduler() {
    let mut modules = ModuleRegistry::new();
    let (pose, steps) = Pose::new(5.0);
    let stand = modules.register("stand", Box::new(pose.finishing_after(3)));
    let (mut motion, _sim, store) = sim_loop(modules);
    let scheduler = Scheduler::new(Arc::clone(&store));

    motion.step().unwrap();
    let request = scheduler.request(
        &stand,
        NONE,
        NONE,
        SectionRequest::new(Priority::Normal).commit(),
    );
    scheduler.update();

    for _ in 0..3 {
        motion.step().unwrap();
        scheduler.update();
    }
    assert_eq!(steps.load(Ordering::SeqCst), 3);
    assert!(request.has_completed());
    assert_eq!(scheduler.outstanding(), 0);
}

/// Simulated bus that loses the next SYNC_WRITE frame once armed.
struct LossyBus {
    bus: SimulatedBus,
    drop_sync_write: Arc<AtomicBool>,
}

impl SerialLink for LossyBus {
    fn name(&self) -> &'static str {
        "lossy"
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.bus.clear_input()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let sync_write = bytes.get(4) == Some(&(Instruction::SyncWrite as u8));
        if sync_write && self.drop_sync_write.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        self.bus.write_bytes(bytes)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.bus.read_bytes(buf)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        self.bus.set_baud_rate(baud)
    }

    fn baud_rate(&self) -> u32 {
        self.bus.baud_rate()
    }

    fn sleep(&mut self, duration: Duration) {
        self.bus.sleep(duration);
    }
}

#[test]
fn failed_joint_write_is_retried_after_assignment_ends() {
    let mut modules = ModuleRegistry::new();
    let (pose, _) = Pose::new(10.0);
    let look = modules.register("look", Box::new(pose));
    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let drop_sync_write = Arc::new(AtomicBool::new(false));
    let link = LossyBus {
        bus,
        drop_sync_write: Arc::clone(&drop_sync_write),
    };
    let store = Arc::new(StateStore::new());
    let scheduler = Scheduler::new(Arc::clone(&store));
    let mut motion = MotionLoop::new(
        &test_config(),
        Some(Box::new(link)),
        modules,
        Arc::clone(&store),
    );

    motion.step().unwrap();
    scheduler.request(&look, SectionRequest::new(Priority::Normal), NONE, NONE);
    scheduler.update();

    drop_sync_write.store(true, Ordering::SeqCst);
    motion.step().unwrap();
    assert_eq!(sim.word(19, Mx28Register::GoalPositionL), mx28::CENTER_VALUE);
    assert!(motion.motion_cycle().unwrap().body().is_dirty());
    // Nothing reached the bus, so no targets are reported.
    assert!(store.get::<BodyControlState>().is_none());

    // The assignment lapses; the pending targets must still go out.
    scheduler.update();
    for _ in 0..5 {
        motion.step().unwrap();
    }
    assert_eq!(sim.word(19, Mx28Register::GoalPositionL), mx28::degs_to_value(10.0));
    assert!(!motion.motion_cycle().unwrap().body().is_dirty());
    assert_eq!(store.get::<BodyControlState>().unwrap().cycle, 3);
}

// ── LEDs ────────────────────────────────────────────────────────────

#[test]
fn led_changes_written_once() {
    let (mut motion, sim, _store) = sim_loop(ModuleRegistry::new());
    let debug = motion.debug_control();
    debug.lock().set_eye_colour([255, 0, 0]);

    motion.step().unwrap();
    motion.step().unwrap();
    assert_eq!(
        sim.word(200, Cm730Register::LedEyeL),
        cm730::color_to_value(255, 0, 0)
    );
    assert!(!debug.lock().is_dirty());
    let writes = sim.instruction_count(Instruction::SyncWrite);

    motion.step().unwrap();
    assert_eq!(sim.instruction_count(Instruction::SyncWrite), writes);
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn failed_reads_are_counted_and_recover() {
    let (mut motion, sim, store) = sim_loop(ModuleRegistry::new());
    let reported = Arc::new(AtomicU32::new(0));
    let r = Arc::clone(&reported);
    motion
        .set_failure_callback(move |count| r.store(count, Ordering::SeqCst))
        .unwrap();

    motion.step().unwrap();
    assert_eq!(hardware_cycle(&store), Some(1));

    sim.set_silent(true);
    for _ in 0..3 {
        motion.step().unwrap();
    }
    assert_eq!(reported.load(Ordering::SeqCst), 3);
    assert_eq!(motion.motion_cycle().unwrap().consecutive_failures(), 3);
    // No state published for failed cycles.
    assert_eq!(hardware_cycle(&store), Some(1));

    sim.set_silent(false);
    motion.step().unwrap();
    assert_eq!(motion.motion_cycle().unwrap().consecutive_failures(), 2);
    assert_eq!(hardware_cycle(&store), Some(5));
}

#[test]
fn garbage_before_response_is_skipped() {
    let (mut motion, sim, store) = sim_loop(ModuleRegistry::new());
    motion.step().unwrap();
    sim.inject_garbage(&[0x00, 0x13, 0x42, 0x07]);
    motion.step().unwrap();
    assert_eq!(hardware_cycle(&store), Some(2));
    assert_eq!(motion.motion_cycle().unwrap().consecutive_failures(), 0);
}

#[test]
fn alarms_are_published() {
    let (mut motion, sim, store) = sim_loop(ModuleRegistry::new());
    sim.set_alarm(13, Mx28Alarm::OVERHEATING);
    motion.step().unwrap();
    let hw = store.get::<HardwareState>().unwrap();
    assert_eq!(hw.joint(JointId::R_KNEE).alarm, Mx28Alarm::OVERHEATING);
    assert!(hw.alarms().contains(Mx28Alarm::OVERHEATING));
}

// ── Power ───────────────────────────────────────────────────────────

#[test]
fn power_off_pauses_cycles_until_restored() {
    let (mut motion, sim, store) = sim_loop(ModuleRegistry::new());
    motion.step().unwrap();
    assert!(sim.is_powered());

    motion.request_power(false);
    motion.step().unwrap();
    assert!(!sim.is_powered());
    assert_eq!(hardware_cycle(&store), Some(1));
    motion.step().unwrap();
    assert_eq!(hardware_cycle(&store), Some(1));

    motion.request_power(true);
    motion.step().unwrap();
    assert!(sim.is_powered());
    assert_eq!(hardware_cycle(&store), Some(4));
    assert_eq!(motion.cycle_count(), 4);
}

// ── No body ─────────────────────────────────────────────────────────

#[test]
fn runs_on_fabricated_state_without_a_link() {
    let mut modules = ModuleRegistry::new();
    let (pose, _) = Pose::new(-20.0);
    let wave = modules.register("wave", Box::new(pose));
    let store = Arc::new(StateStore::new());
    let mut motion = MotionLoop::new(&test_config(), None, modules, Arc::clone(&store));
    let scheduler = Scheduler::new(Arc::clone(&store));

    motion.step().unwrap();
    assert!(!motion.motion_cycle().unwrap().has_body());
    assert!(store.get::<StaticHardwareState>().is_some());

    scheduler.request(&wave, NONE, SectionRequest::new(Priority::Normal), NONE);
    scheduler.update();
    motion.step().unwrap();

    let hw = store.get::<HardwareState>().unwrap();
    assert_eq!(hw.cycle, 2);
    assert_eq!(
        hw.joint(JointId::L_ELBOW).present_position_value,
        mx28::degs_to_value(-20.0)
    );
    assert!(!motion.motion_cycle().unwrap().body().is_dirty());
    assert!(motion.disconnect().unwrap());
}

// ── Threaded lifecycle ──────────────────────────────────────────────

#[test]
fn start_stop_on_motion_thread() {
    let (mut motion, sim, store) = sim_loop(ModuleRegistry::new());
    assert!(matches!(motion.stop(), Err(MotionError::NotRunning)));

    motion.start_with_clock(Box::new(VirtualClock::new())).unwrap();
    assert_eq!(motion.state(), LoopState::Running);
    assert!(matches!(
        motion.start_with_clock(Box::new(VirtualClock::new())),
        Err(MotionError::AlreadyRunning)
    ));
    assert!(matches!(motion.step(), Err(MotionError::AlreadyRunning)));

    for _ in 0..1000 {
        if motion.cycle_count() >= 10 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(motion.cycle_count() >= 10);
    assert!(store.get::<HardwareState>().is_some());
    assert_eq!(sim.register(7, Mx28Register::TorqueEnable), 1);

    motion.stop().unwrap();
    assert_eq!(motion.state(), LoopState::Stopped);
    assert_eq!(sim.register(7, Mx28Register::TorqueEnable), 0);

    // Stepping resumes where the thread left off.
    let before = motion.cycle_count();
    motion.step().unwrap();
    assert_eq!(motion.cycle_count(), before + 1);
}
