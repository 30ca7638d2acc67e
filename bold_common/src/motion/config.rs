//! Motion loop configuration.
//!
//! The RT parameters of the motion thread are plain configuration values so
//! tests can run the loop without real OS scheduling.

use crate::config::ConfigError;
use crate::consts::{DEFAULT_PERIOD_MS, DEFAULT_RT_PRIORITY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}

fn default_rt_priority() -> i32 {
    DEFAULT_RT_PRIORITY
}

fn default_power_check_interval() -> u64 {
    60
}

fn default_failure_escalation() -> u32 {
    // ~1 s of consecutive failures at 8 ms.
    125
}

fn default_stats_interval() -> u64 {
    // ~10 s at 8 ms.
    1250
}

/// Scheduling policy of the motion thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// `SCHED_RR`.
    #[default]
    RoundRobin,
    /// `SCHED_FIFO`.
    Fifo,
    /// `SCHED_OTHER` (no RT priority).
    Other,
}

/// `[motion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotionConfig {
    /// Cycle period [ms].
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// RT priority of the motion thread.
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,

    #[serde(default)]
    pub policy: SchedPolicy,

    /// Query the power rail every N cycles.
    #[serde(default = "default_power_check_interval")]
    pub power_check_interval: u64,

    /// Consecutive failed reads after which the process supervisor gives up.
    #[serde(default = "default_failure_escalation")]
    pub failure_escalation: u32,

    /// Log cycle statistics every N cycles (0 disables).
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,

    /// Pin the motion thread to this CPU core.
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// Lock all memory pages before entering the loop.
    #[serde(default)]
    pub lock_memory: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            rt_priority: default_rt_priority(),
            policy: SchedPolicy::default(),
            power_check_interval: default_power_check_interval(),
            failure_escalation: default_failure_escalation(),
            stats_interval: default_stats_interval(),
            cpu_core: None,
            lock_memory: false,
        }
    }
}

impl MotionConfig {
    /// Validate the motion configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "period_ms must be greater than 0".to_string(),
            ));
        }
        if self.power_check_interval == 0 {
            return Err(ConfigError::ValidationError(
                "power_check_interval must be greater than 0".to_string(),
            ));
        }
        if self.policy != SchedPolicy::Other && !(1..=99).contains(&self.rt_priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt_priority {} outside 1..=99",
                self.rt_priority
            )));
        }
        if self.failure_escalation == 0 {
            return Err(ConfigError::ValidationError(
                "failure_escalation must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Cycle period as a `Duration`.
    #[inline]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}
