//! 8 ms motion loop.
//!
//! Owns the CM730 engine on a dedicated thread. Each cycle steps the modules
//! the scheduler assigned, writes dirty joint targets and LEDs, reads the
//! dynamic state of the whole body and publishes it to the [`StateStore`].
//!
//! ## Threading
//! [`MotionLoop::start`] moves the [`MotionCycle`] onto the motion thread;
//! [`MotionLoop::stop`] joins it and takes the cycle back. Other threads talk
//! to a running loop through [`PendingCommands`], the shared
//! [`DebugControl`] and the store only.
//!
//! ## Failure Handling
//! A failed bulk read skips publishing for that cycle and raises the
//! consecutive failure count, reported through the failure callback. Each
//! successful read lowers the count by one.

pub mod commands;
pub mod lifecycle;
pub mod step;

use bold_cm730::SerialLink;
use bold_common::config::RobotConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::body::DebugControl;
use crate::cycle::{CycleClock, CycleStats, MonotonicClock, Pacer, StepTimer, rt_setup};
use crate::error::MotionError;
use crate::module::ModuleRegistry;
use crate::state::{MotionTimingState, StateStore};

pub use commands::PendingCommands;
pub use lifecycle::{Lifecycle, LoopEvent, LoopState, TransitionResult};
pub use step::{FailureCallback, MotionCycle};

const THREAD_NAME: &str = "motion";

pub struct MotionLoop {
    lifecycle: Lifecycle,
    /// Present while stopped.
    cycle: Option<MotionCycle>,
    /// Present while running.
    thread: Option<JoinHandle<MotionCycle>>,
    stop: Arc<AtomicBool>,
    commands: Arc<PendingCommands>,
    debug: Arc<Mutex<DebugControl>>,
    store: Arc<StateStore>,
    cycle_counter: Arc<AtomicU64>,
}

impl MotionLoop {
    /// Create a stopped loop. `link` is `None` to run without a body.
    pub fn new(
        config: &RobotConfig,
        link: Option<Box<dyn SerialLink>>,
        modules: ModuleRegistry,
        store: Arc<StateStore>,
    ) -> Self {
        let commands = Arc::new(PendingCommands::new());
        let debug = Arc::new(Mutex::new(DebugControl::new()));
        let cycle_counter = Arc::new(AtomicU64::new(0));
        let cycle = MotionCycle::new(
            config.hardware.clone(),
            config.motion.clone(),
            link,
            modules,
            Arc::clone(&store),
            Arc::clone(&debug),
            Arc::clone(&commands),
            Arc::clone(&cycle_counter),
        );
        Self {
            lifecycle: Lifecycle::new(),
            cycle: Some(cycle),
            thread: None,
            stop: Arc::new(AtomicBool::new(false)),
            commands,
            debug,
            store,
            cycle_counter,
        }
    }

    fn transition(&mut self, event: LoopEvent) -> Result<LoopState, MotionError> {
        match self.lifecycle.handle_event(event) {
            TransitionResult::Ok(state) => Ok(state),
            TransitionResult::Rejected(_) if event == LoopEvent::Start => {
                Err(MotionError::AlreadyRunning)
            }
            TransitionResult::Rejected(_) if event == LoopEvent::Stop => {
                Err(MotionError::NotRunning)
            }
            TransitionResult::Rejected(reason) => Err(MotionError::Rejected(reason)),
        }
    }

    /// Connect and start the motion thread on `CLOCK_MONOTONIC`.
    pub fn start(&mut self) -> Result<(), MotionError> {
        let clock = MonotonicClock::new()?;
        self.start_with_clock(Box::new(clock))
    }

    /// Connect and start the motion thread paced by `clock`.
    ///
    /// Returns once the thread has finished its RT setup. A setup failure
    /// leaves the loop stopped.
    pub fn start_with_clock(&mut self, clock: Box<dyn CycleClock>) -> Result<(), MotionError> {
        self.transition(LoopEvent::Start)?;
        let Some(mut cycle) = self.cycle.take() else {
            self.transition(LoopEvent::StartFailed)?;
            return Err(MotionError::ThreadPanicked);
        };

        cycle.connect();
        self.stop.store(false, Ordering::Release);

        let (ready_tx, ready_rx) = mpsc::channel();
        let stop = Arc::clone(&self.stop);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let setup = rt_setup(&cycle.motion);
                let failed = setup.is_err();
                let _ = ready_tx.send(setup);
                if !failed {
                    run_cycles(&mut cycle, clock, &stop);
                }
                cycle
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(LoopEvent::StartFailed)?;
                return Err(MotionError::ThreadSpawn(e.to_string()));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                self.transition(LoopEvent::Started)?;
                info!("motion loop started");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "motion thread RT setup failed");
                self.cycle = handle.join().ok();
                self.transition(LoopEvent::StartFailed)?;
                Err(e.into())
            }
            Err(_) => {
                self.transition(LoopEvent::StartFailed)?;
                Err(MotionError::ThreadPanicked)
            }
        }
    }

    /// Stop the motion thread and disable torque.
    pub fn stop(&mut self) -> Result<(), MotionError> {
        self.transition(LoopEvent::Stop)?;
        self.stop.store(true, Ordering::Release);
        let joined = self.thread.take().map(JoinHandle::join);
        self.transition(LoopEvent::Exited)?;

        match joined {
            Some(Ok(mut cycle)) => {
                cycle.release();
                info!(cycles = cycle.cycle(), "motion loop stopped");
                self.cycle = Some(cycle);
                Ok(())
            }
            _ => {
                error!("motion thread panicked");
                Err(MotionError::ThreadPanicked)
            }
        }
    }

    /// Run one cycle on the calling thread. Only valid while stopped.
    ///
    /// Connects on first use.
    pub fn step(&mut self) -> Result<(), MotionError> {
        if self.lifecycle.state() != LoopState::Stopped {
            return Err(MotionError::AlreadyRunning);
        }
        let cycle = self.cycle.as_mut().ok_or(MotionError::ThreadPanicked)?;
        if cycle.cycle() == 0 {
            cycle.connect();
        }
        let mut timer = StepTimer::new();
        cycle.step(&mut timer);
        let cycle_number = cycle.cycle();
        self.store.set(MotionTimingState {
            cycle: cycle_number,
            steps: timer.finish(),
        });
        Ok(())
    }

    /// Power the actuators off and the CM730 LEDs out. Only while stopped.
    pub fn disconnect(&mut self) -> Result<bool, MotionError> {
        if self.lifecycle.state() != LoopState::Stopped {
            return Err(MotionError::AlreadyRunning);
        }
        let cycle = self.cycle.as_mut().ok_or(MotionError::ThreadPanicked)?;
        Ok(cycle.disconnect())
    }

    /// Install the callback for failed reads. Only while stopped.
    pub fn set_failure_callback(
        &mut self,
        callback: impl Fn(u32) + Send + Sync + 'static,
    ) -> Result<(), MotionError> {
        let cycle = self.cycle.as_mut().ok_or(MotionError::AlreadyRunning)?;
        cycle.on_failure = Some(Arc::new(callback));
        Ok(())
    }

    pub fn request_power(&self, on: bool) {
        self.commands.request_power(on);
    }

    pub fn request_torque(&self, on: bool) {
        self.commands.request_torque(on);
    }

    /// Re-read static actuator settings on the next cycle.
    pub fn request_static_refresh(&self) {
        self.commands.request_static_refresh();
    }

    /// LED targets, written on the next cycle after they change.
    pub fn debug_control(&self) -> Arc<Mutex<DebugControl>> {
        Arc::clone(&self.debug)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn state(&self) -> LoopState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.state() == LoopState::Running
    }

    /// Cycles completed so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_counter.load(Ordering::Acquire)
    }

    /// The cycle state, while stopped.
    pub fn motion_cycle(&self) -> Option<&MotionCycle> {
        self.cycle.as_ref()
    }
}

impl Drop for MotionLoop {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "motion loop did not stop cleanly");
            }
        }
    }
}

fn run_cycles(cycle: &mut MotionCycle, clock: Box<dyn CycleClock>, stop: &AtomicBool) {
    let period = cycle.motion.period();
    let stats_interval = cycle.motion.stats_interval;
    let mut pacer = Pacer::new(clock, period);
    let mut stats = CycleStats::default();
    debug!(?period, "motion thread running");

    while !stop.load(Ordering::Acquire) {
        pacer.begin();
        let mut timer = StepTimer::new();
        cycle.step(&mut timer);
        let wake = pacer.wait();

        stats.record(&wake);
        if wake.overrun {
            debug!(busy = ?wake.busy, cycle = cycle.cycle(), "motion cycle overrun");
        }
        cycle.store.set(MotionTimingState {
            cycle: cycle.cycle(),
            steps: timer.finish(),
        });

        if stats_interval > 0 && stats.cycles >= stats_interval {
            let window = stats.take();
            info!(
                cycle = cycle.cycle(),
                avg_us = window.avg_busy().as_micros() as u64,
                max_us = window.max_busy.as_micros() as u64,
                max_latency_us = window.max_latency.as_micros() as u64,
                overruns = window.overruns,
                "motion cycle stats"
            );
        }
    }
}
