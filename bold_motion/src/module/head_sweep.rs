//! Sweeps the head pan joint back and forth.

use bold_common::joint::JointSelection;
use std::f64::consts::TAU;

use super::{MotionModule, StepOutcome};
use crate::body::{ArmSection, HeadSection, LegSection};

pub struct HeadSweep {
    amplitude_degs: f64,
    tilt_degs: f64,
    period_cycles: u64,
    /// Finish after this many head cycles.
    duration_cycles: Option<u64>,
    cycle: u64,
}

impl HeadSweep {
    pub fn new(amplitude_degs: f64, period_cycles: u64) -> Self {
        Self {
            amplitude_degs,
            tilt_degs: 0.0,
            period_cycles: period_cycles.max(1),
            duration_cycles: None,
            cycle: 0,
        }
    }

    pub fn with_tilt(mut self, tilt_degs: f64) -> Self {
        self.tilt_degs = tilt_degs;
        self
    }

    pub fn with_duration(mut self, cycles: u64) -> Self {
        self.duration_cycles = Some(cycles);
        self
    }

    pub fn pan_degs(&self) -> f64 {
        let phase = (self.cycle % self.period_cycles) as f64 / self.period_cycles as f64;
        self.amplitude_degs * (phase * TAU).sin()
    }
}

impl MotionModule for HeadSweep {
    fn initialize(&mut self) {
        self.cycle = 0;
    }

    fn step(&mut self, selection: JointSelection) -> StepOutcome {
        if !selection.has_head() {
            return StepOutcome::Continue;
        }
        self.cycle += 1;
        match self.duration_cycles {
            Some(limit) if self.cycle >= limit => {
                self.cycle = 0;
                StepOutcome::Completed
            }
            _ => StepOutcome::Continue,
        }
    }

    fn apply_head(&mut self, head: &mut HeadSection<'_>) {
        let pan = self.pan_degs();
        head.pan().set_degrees(pan);
        head.tilt().set_degrees(self.tilt_degs);
    }

    fn apply_arms(&mut self, _arms: &mut ArmSection<'_>) {}

    fn apply_legs(&mut self, _legs: &mut LegSection<'_>) {}
}
