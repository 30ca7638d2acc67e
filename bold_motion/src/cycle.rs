//! Cycle pacing, timing statistics and RT thread setup.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` when configured.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` when a CPU core is configured.
//! 4. `sched_setscheduler(SCHED_RR | SCHED_FIFO, priority)`.
//!
//! All syscalls are no-ops without the `rt` feature.
//!
//! ## Pacing
//! Deadlines advance by exactly one period from the previous deadline, never
//! from the wake time, so jitter does not accumulate. A late cycle does not
//! move later deadlines either. Time comes from a [`CycleClock`]:
//! [`MonotonicClock`] on the robot, [`VirtualClock`] in tests.

use bold_common::motion::config::{MotionConfig, SchedPolicy};
use serde::Serialize;
use std::time::{Duration, Instant};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Pacing figures accumulated over one reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub total_busy: Duration,
    pub max_busy: Duration,
    /// Worst wake-up delay past a deadline.
    pub max_latency: Duration,
    pub overruns: u64,
}

impl CycleStats {
    pub fn record(&mut self, wake: &Wake) {
        self.cycles += 1;
        self.total_busy += wake.busy;
        self.max_busy = self.max_busy.max(wake.busy);
        self.max_latency = self.max_latency.max(wake.latency);
        self.overruns += u64::from(wake.overrun);
    }

    pub fn avg_busy(&self) -> Duration {
        u32::try_from(self.cycles)
            .ok()
            .and_then(|n| self.total_busy.checked_div(n))
            .unwrap_or_default()
    }

    /// Hand out the current window and start a new one.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

// ─── Step Timing ────────────────────────────────────────────────────

/// Duration of one named step within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTiming {
    pub label: String,
    pub duration: Duration,
}

/// Records the time spent between successive events.
#[derive(Debug)]
pub struct StepTimer {
    last: Instant,
    steps: Vec<StepTiming>,
}

impl Default for StepTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            steps: Vec::with_capacity(16),
        }
    }

    /// Close the current step under `label` and start the next one.
    pub fn event(&mut self, label: impl Into<String>) {
        let now = Instant::now();
        self.steps.push(StepTiming {
            label: label.into(),
            duration: now.duration_since(self.last),
        });
        self.last = now;
    }

    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    pub fn total(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn finish(self) -> Vec<StepTiming> {
        self.steps
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or pacing.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleError {
    /// RT system call failed.
    RtSetup(String),
    /// Monotonic clock unavailable.
    Clock(String),
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
            Self::Clock(msg) => write!(f, "clock error: {msg}"),
        }
    }
}

impl std::error::Error for CycleError {}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the loop does not fault on first use.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the calling thread to a CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

/// Switch the calling thread to an RT scheduling policy.
#[cfg(feature = "rt")]
fn rt_set_scheduler(policy: SchedPolicy, priority: i32) -> Result<(), CycleError> {
    let (native, priority) = match policy {
        SchedPolicy::RoundRobin => (libc::SCHED_RR, priority),
        SchedPolicy::Fifo => (libc::SCHED_FIFO, priority),
        SchedPolicy::Other => (libc::SCHED_OTHER, 0),
    };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, native, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler({policy:?}, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_policy: SchedPolicy, _priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup for the calling thread.
///
/// Called from inside the motion thread before its first cycle.
pub fn rt_setup(config: &MotionConfig) -> Result<(), CycleError> {
    if config.lock_memory {
        rt_mlockall()?;
    }
    prefault_stack();
    if let Some(cpu) = config.cpu_core {
        rt_set_affinity(cpu)?;
    }
    rt_set_scheduler(config.policy, config.rt_priority)?;
    Ok(())
}

// ─── Clocks ─────────────────────────────────────────────────────────

/// Time source for the cycle pacer.
///
/// Times are offsets from an arbitrary clock-specific origin.
pub trait CycleClock: Send {
    fn now(&self) -> Duration;

    /// Block until `deadline`. Returns at once if it already passed.
    fn sleep_until(&mut self, deadline: Duration);
}

/// `CLOCK_MONOTONIC`.
pub struct MonotonicClock {
    origin: Instant,
    #[cfg(feature = "rt")]
    origin_ts: nix::sys::time::TimeSpec,
}

impl MonotonicClock {
    #[cfg(feature = "rt")]
    pub fn new() -> Result<Self, CycleError> {
        use nix::time::{ClockId, clock_gettime};
        let origin_ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CycleError::Clock(format!("clock_gettime: {e}")))?;
        Ok(Self {
            origin: Instant::now(),
            origin_ts,
        })
    }

    #[cfg(not(feature = "rt"))]
    pub fn new() -> Result<Self, CycleError> {
        Ok(Self {
            origin: Instant::now(),
        })
    }
}

impl CycleClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    #[cfg(feature = "rt")]
    fn sleep_until(&mut self, deadline: Duration) {
        use nix::errno::Errno;
        use nix::sys::time::TimeSpec;
        use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};

        let wake = self.origin_ts + TimeSpec::from_duration(deadline);
        while let Err(Errno::EINTR) = clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &wake,
        ) {}
    }

    #[cfg(not(feature = "rt"))]
    fn sleep_until(&mut self, deadline: Duration) {
        let remaining = deadline.saturating_sub(self.now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Manually advanced clock. Sleeping jumps straight to the deadline.
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    now: Duration,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate work taking `elapsed`.
    pub fn advance(&mut self, elapsed: Duration) {
        self.now += elapsed;
    }
}

impl CycleClock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep_until(&mut self, deadline: Duration) {
        if deadline > self.now {
            self.now = deadline;
        }
    }
}

impl<C: CycleClock + ?Sized> CycleClock for Box<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep_until(&mut self, deadline: Duration) {
        (**self).sleep_until(deadline)
    }
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// Outcome of waiting for the end of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    /// Time spent working before the sleep.
    pub busy: Duration,
    /// How late the wake came relative to the deadline.
    pub latency: Duration,
    /// The work ran past the deadline.
    pub overrun: bool,
}

/// Absolute-deadline cycle pacer.
pub struct Pacer<C: CycleClock> {
    clock: C,
    period: Duration,
    deadline: Duration,
    cycle_start: Duration,
}

impl<C: CycleClock> Pacer<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        let now = clock.now();
        Self {
            clock,
            period,
            deadline: now,
            cycle_start: now,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Deadline of the current cycle.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Start a cycle: the deadline moves one period past the previous one.
    pub fn begin(&mut self) {
        self.deadline += self.period;
        self.cycle_start = self.clock.now();
    }

    /// Sleep until the current deadline.
    pub fn wait(&mut self) -> Wake {
        let before = self.clock.now();
        let busy = before.saturating_sub(self.cycle_start);
        let overrun = before > self.deadline;
        self.clock.sleep_until(self.deadline);
        let latency = self.clock.now().saturating_sub(self.deadline);
        Wake {
            busy,
            latency,
            overrun,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
