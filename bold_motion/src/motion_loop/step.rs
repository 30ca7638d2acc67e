//! Work of one motion cycle.
//!
//! ```text
//! commands ─▶ power check ─▶ modules ─▶ sync write ─▶ LEDs ─▶ bulk read ─▶ observers
//!                 │ (unpowered: stop here)
//! ```
//!
//! Modules only run once the body has been seeded from a first successful
//! read, so the first write reproduces the pose the robot is already in.

use bold_cm730::{BulkRead, Cm730, Mx28Alarm, SerialLink};
use bold_common::hardware::config::HardwareConfig;
use bold_common::joint::JointId;
use bold_common::motion::config::MotionConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use super::commands::PendingCommands;
use crate::body::{BodyControl, DebugControl};
use crate::cycle::StepTimer;
use crate::hardware_init::initialise_hardware;
use crate::module::{ModuleRegistry, StepOutcome};
use crate::state::{
    BodyControlState, HardwareState, MotionTaskState, ObserverThread, StateStore,
    StaticHardwareState,
};

/// Called with the number of consecutive failed reads.
pub type FailureCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Everything the motion thread owns.
pub struct MotionCycle {
    pub(super) hardware: HardwareConfig,
    pub(super) motion: MotionConfig,
    link: Option<Box<dyn SerialLink>>,
    cm730: Option<Cm730>,
    connected: bool,
    body: BodyControl,
    debug: Arc<Mutex<DebugControl>>,
    modules: ModuleRegistry,
    pub(super) store: Arc<StateStore>,
    commands: Arc<PendingCommands>,
    dynamic_read: BulkRead,
    static_read: BulkRead,
    cycle: u64,
    cycle_counter: Arc<AtomicU64>,
    read_yet: bool,
    powered: bool,
    static_needed: bool,
    consecutive_failures: u32,
    last_alarms: Mx28Alarm,
    pub(super) on_failure: Option<FailureCallback>,
}

impl MotionCycle {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        hardware: HardwareConfig,
        motion: MotionConfig,
        link: Option<Box<dyn SerialLink>>,
        modules: ModuleRegistry,
        store: Arc<StateStore>,
        debug: Arc<Mutex<DebugControl>>,
        commands: Arc<PendingCommands>,
        cycle_counter: Arc<AtomicU64>,
    ) -> Self {
        let mut body = BodyControl::new();
        for joint in JointId::all() {
            body.set_offset(joint, hardware.offset(joint));
        }
        Self {
            hardware,
            motion,
            link,
            cm730: None,
            connected: false,
            body,
            debug,
            modules,
            store,
            commands,
            dynamic_read: BulkRead::dynamic(),
            static_read: BulkRead::static_state(),
            cycle: 0,
            cycle_counter,
            read_yet: false,
            powered: true,
            static_needed: true,
            consecutive_failures: 0,
            last_alarms: Mx28Alarm::empty(),
            on_failure: None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.cm730.is_some()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn body(&self) -> &BodyControl {
        &self.body
    }

    /// Power the body, write limits and enable torque.
    ///
    /// Without a link, or if the CM730 does not answer, the loop runs on
    /// fabricated hardware state instead.
    pub(super) fn connect(&mut self) {
        if !self.connected {
            self.connected = true;
            self.modules.initialize_all();
            if let Some(link) = self.link.take() {
                let mut cm = Cm730::new(link);
                match cm.connect() {
                    Ok(()) => {
                        initialise_hardware(&mut cm, &self.hardware);
                        self.cm730 = Some(cm);
                    }
                    Err(e) => {
                        error!(error = %e, "CM730 not responding, running without a body");
                    }
                }
            } else {
                info!("no link configured, running without a body");
            }
        }

        if let Some(cm) = self.cm730.as_mut() {
            if !cm.torque_enable(true) {
                warn!("torque enable failed on some joints");
            }
            self.powered = true;
        }
        self.read_yet = false;
        self.static_needed = true;
    }

    /// Disable torque on every joint. No-op without a body.
    pub(super) fn release(&mut self) {
        if let Some(cm) = self.cm730.as_mut() {
            if !cm.torque_enable(false) {
                warn!("torque disable failed on some joints");
            }
        }
    }

    /// Switch LEDs and power off. No-op without a body.
    pub(super) fn disconnect(&mut self) -> bool {
        match self.cm730.as_mut() {
            Some(cm) => cm.disconnect(),
            None => true,
        }
    }

    pub fn step(&mut self, timer: &mut StepTimer) {
        self.cycle += 1;
        self.cycle_counter.store(self.cycle, Ordering::Release);

        self.apply_commands(timer);

        if self.has_body() && self.cycle % self.motion.power_check_interval == 0 {
            self.check_power();
            timer.event("Check Power");
        }
        if !self.powered {
            return;
        }

        if self.read_yet {
            self.apply_modules(timer);
            // Also flushes targets left over from a failed write.
            if self.body.is_dirty() && self.write_joints(timer) {
                self.store
                    .set(BodyControlState::from_body(&self.body, self.cycle));
            }
            self.write_debug(timer);
        }

        if let Some(hw) = self.read_hardware(timer) {
            self.log_alarm_changes(&hw);
            if !self.read_yet {
                self.body.update_from_hardware_state(&hw);
                self.read_yet = true;
                debug!(cycle = self.cycle, "joint targets seeded from hardware");
            }
            self.store.set(hw);
        }

        self.store.callback_observers(ObserverThread::Motion, timer);
    }

    fn apply_commands(&mut self, timer: &mut StepTimer) {
        if self.commands.take_static_refresh() {
            self.static_needed = true;
        }
        let power = self.commands.take_power();
        let torque = self.commands.take_torque();
        if power.is_none() && torque.is_none() {
            return;
        }
        let Some(cm) = self.cm730.as_mut() else {
            debug!(?power, ?torque, "no body, command ignored");
            return;
        };
        let switched = power.filter(|&on| cm.power_enable(on).is_ok());
        if let Some(on) = torque {
            if !cm.torque_enable(on) {
                warn!(on, "torque command failed on some joints");
            }
            self.static_needed = true;
        }
        if let Some(on) = switched {
            self.set_powered(on);
        }
        timer.event("Commands");
    }

    fn check_power(&mut self) {
        let Some(cm) = self.cm730.as_mut() else {
            return;
        };
        match cm.is_power_enabled() {
            Ok(on) => self.set_powered(on),
            Err(e) => debug!(error = %e, "power check failed"),
        }
    }

    fn set_powered(&mut self, on: bool) {
        if on == self.powered {
            return;
        }
        self.powered = on;
        if on {
            info!("actuator power on");
            // Actuators restart from wherever they are.
            self.read_yet = false;
            self.static_needed = true;
        } else {
            warn!("actuator power off, skipping cycles");
        }
    }

    /// Step every assigned module.
    fn apply_modules(&mut self, timer: &mut StepTimer) {
        let Some(tasks) = self.store.get::<MotionTaskState>() else {
            return;
        };
        for assignment in &tasks.assignments {
            let Some((handle, module)) = self.modules.get_mut(assignment.module) else {
                warn!(module = %assignment.name, "assigned module is not registered");
                continue;
            };
            let selection = assignment.selection;
            if module.step(selection) == StepOutcome::Completed {
                handle.signal_completed();
            }
            if selection.has_head() {
                module.apply_head(&mut self.body.head());
            }
            if selection.has_arms() {
                module.apply_arms(&mut self.body.arms());
            }
            if selection.has_legs() {
                module.apply_legs(&mut self.body.legs());
            }
            timer.event(handle.name());
        }
    }

    /// Send dirty joints. Returns true once they are on the bus; on failure
    /// they stay dirty for the next cycle.
    fn write_joints(&mut self, timer: &mut StepTimer) -> bool {
        let Some(plan) = self.body.sync_write_plan() else {
            return false;
        };
        let written = match self.cm730.as_mut() {
            Some(cm) => cm
                .sync_write(plan.from, plan.bytes_per_device, plan.device_count, &plan.payload)
                .inspect_err(
                    |e| warn!(error = %e, devices = plan.device_count, "joint sync write failed"),
                )
                .is_ok(),
            None => true,
        };
        if written {
            self.body.clear_dirty();
        }
        timer.event("Write MX28s");
        written
    }

    fn write_debug(&mut self, timer: &mut StepTimer) {
        let plan = {
            let debug = self.debug.lock();
            if !debug.is_dirty() {
                return;
            }
            debug.sync_write_plan()
        };
        let written = match self.cm730.as_mut() {
            Some(cm) => cm
                .sync_write(plan.from, plan.bytes_per_device, plan.device_count, &plan.payload)
                .inspect_err(|e| warn!(error = %e, "LED sync write failed"))
                .is_ok(),
            None => true,
        };
        if written {
            let mut debug = self.debug.lock();
            // Changed again while writing: keep it dirty for the next cycle.
            if debug.sync_write_plan() == plan {
                debug.clear_dirty_flags();
            }
        }
        timer.event("Write CM730");
    }

    fn read_hardware(&mut self, timer: &mut StepTimer) -> Option<HardwareState> {
        let Some(cm) = self.cm730.as_mut() else {
            if self.static_needed {
                self.store.set(StaticHardwareState::fake());
                self.static_needed = false;
            }
            let debug = self.debug.lock();
            return Some(HardwareState::fake(&self.body, &debug, self.cycle));
        };

        if self.static_needed {
            match cm.bulk_read(&mut self.static_read) {
                Ok(()) => match StaticHardwareState::from_bulk_read(&self.static_read) {
                    Ok(state) => {
                        self.store.set(state);
                        self.static_needed = false;
                    }
                    Err(e) => warn!(error = %e, "static hardware state incomplete"),
                },
                Err(e) => warn!(error = %e, "static bulk read failed"),
            }
            timer.event("Read Static");
        }

        let result = cm.bulk_read(&mut self.dynamic_read);
        timer.event("Read Dynamic");
        if let Err(e) = result {
            self.consecutive_failures += 1;
            warn!(
                error = %e,
                failures = self.consecutive_failures,
                responded = self.dynamic_read.responded(),
                "bulk read failed, no hardware state this cycle"
            );
            if let Some(callback) = &self.on_failure {
                callback(self.consecutive_failures);
            }
            return None;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_sub(1);

        HardwareState::from_bulk_read(&self.dynamic_read, cm.rx_bytes(), cm.tx_bytes(), self.cycle)
            .inspect_err(|e| warn!(error = %e, "hardware state incomplete"))
            .ok()
    }

    fn log_alarm_changes(&mut self, hw: &HardwareState) {
        let alarms = hw.alarms();
        if alarms == self.last_alarms {
            return;
        }
        let raised = alarms.diff(self.last_alarms);
        if raised.is_empty() {
            info!(alarms = %alarms, "actuator alarms cleared");
        } else {
            for mx in hw.mx28.iter().filter(|mx| mx.alarm.intersects(raised)) {
                warn!(id = mx.id, alarm = %mx.alarm, "actuator alarm");
            }
        }
        self.last_alarms = alarms;
    }
}
