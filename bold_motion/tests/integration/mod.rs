//! Shared fixtures for the integration tests.

mod config;
mod end_to_end;
mod motion_loop;
mod scheduler;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bold_common::config::RobotConfig;
use bold_common::joint::JointSelection;
use bold_motion::body::{ArmSection, HeadSection, LegSection};
use bold_motion::{MotionModule, StepOutcome};

/// Config with no retry delays, suitable for the simulated bus.
pub fn test_config() -> RobotConfig {
    let mut config = RobotConfig::default();
    config.hardware.init_attempts = 1;
    config.hardware.init_retry_delay_ms = 0;
    config
}

/// Drives every selected joint to a fixed angle.
///
/// Counts its steps and optionally completes after a number of them.
pub struct Pose {
    degrees: f64,
    steps: Arc<AtomicUsize>,
    finish_after: Option<usize>,
}

impl Pose {
    pub fn new(degrees: f64) -> (Self, Arc<AtomicUsize>) {
        let steps = Arc::new(AtomicUsize::new(0));
        let pose = Self {
            degrees,
            steps: Arc::clone(&steps),
            finish_after: None,
        };
        (pose, steps)
    }

    pub fn finishing_after(mut self, steps: usize) -> Self {
        self.finish_after = Some(steps);
        self
    }
}

impl MotionModule for Pose {
    fn step(&mut self, selection: JointSelection) -> StepOutcome {
        if selection.is_empty() {
            return StepOutcome::Continue;
        }
        let steps = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        match self.finish_after {
            Some(limit) if steps >= limit => StepOutcome::Completed,
            _ => StepOutcome::Continue,
        }
    }

    fn apply_head(&mut self, head: &mut HeadSection<'_>) {
        head.visit_joints(|j| j.set_degrees(self.degrees));
    }

    fn apply_arms(&mut self, arms: &mut ArmSection<'_>) {
        arms.visit_joints(|j| j.set_degrees(self.degrees));
    }

    fn apply_legs(&mut self, legs: &mut LegSection<'_>) {
        legs.visit_joints(|j| j.set_degrees(self.degrees));
    }
}
