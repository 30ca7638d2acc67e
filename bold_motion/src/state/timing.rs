//! Per-cycle step timings of the motion thread.

use serde::Serialize;
use std::time::Duration;

use crate::cycle::StepTiming;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionTimingState {
    pub cycle: u64,
    pub steps: Vec<StepTiming>,
}

impl MotionTimingState {
    pub fn total(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }
}
