//! Scheduler output consumed by the motion thread.

use bold_common::joint::{BodySection, JointSelection};
use std::sync::Arc;

use crate::module::ModuleId;
use crate::scheduler::{Priority, TaskStatus};

/// Sections one module drives this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleAssignment {
    pub module: ModuleId,
    pub name: Arc<str>,
    pub selection: JointSelection,
}

/// Diagnostic view of one task at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub module: ModuleId,
    pub section: BodySection,
    pub priority: Priority,
    pub status: TaskStatus,
    pub committed: bool,
}

/// Result of one scheduler resolution pass.
///
/// At most one assignment per module and at most three in total.
#[derive(Debug, Clone, Default)]
pub struct MotionTaskState {
    pub assignments: heapless::Vec<ModuleAssignment, 3>,
    pub head: Option<TaskSummary>,
    pub arms: Option<TaskSummary>,
    pub legs: Option<TaskSummary>,
    /// Tasks still outstanding after the pass.
    pub tasks: Vec<TaskSummary>,
}

impl MotionTaskState {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Sections assigned to `module`, empty if none.
    pub fn selection_for(&self, module: ModuleId) -> JointSelection {
        self.assignments
            .iter()
            .find(|a| a.module == module)
            .map_or(JointSelection::empty(), |a| a.selection)
    }

    pub fn winner(&self, section: BodySection) -> Option<&TaskSummary> {
        match section {
            BodySection::Head => self.head.as_ref(),
            BodySection::Arms => self.arms.as_ref(),
            BodySection::Legs => self.legs.as_ref(),
        }
    }
}
