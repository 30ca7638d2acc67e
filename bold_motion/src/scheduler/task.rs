//! Motion tasks and requests.

use bold_common::joint::BodySection;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::module::ModuleId;

/// Task priority. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Section not requested.
    #[default]
    None,
    Low,
    Normal,
    High,
}

/// Lifecycle of a task.
///
/// `Pending → Selected → Completed` or `Pending → Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    Pending = 0,
    Selected = 1,
    Ignored = 2,
    Completed = 3,
}

impl TaskStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Selected,
            2 => Self::Ignored,
            _ => Self::Completed,
        }
    }

    /// No further transitions happen from this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ignored | Self::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Selected => "Selected",
            Self::Ignored => "Ignored",
            Self::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// What a request asks for one body section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionRequest {
    pub priority: Priority,
    /// The other sections of the request depend on this one.
    pub required: bool,
    /// Keep the section once selected, until the module completes.
    pub commit: bool,
}

impl SectionRequest {
    pub const NONE: Self = Self {
        priority: Priority::None,
        required: false,
        commit: false,
    };

    pub const fn new(priority: Priority) -> Self {
        Self {
            priority,
            required: false,
            commit: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn commit(mut self) -> Self {
        self.commit = true;
        self
    }

    pub const fn is_requested(&self) -> bool {
        !matches!(self.priority, Priority::None)
    }
}

/// One module's claim on one body section.
///
/// Shared between the scheduler and the caller's [`MotionRequest`]; status
/// and commitment are atomics so the caller can poll without the scheduler
/// lock.
#[derive(Debug)]
pub struct MotionTask {
    module: ModuleId,
    section: BodySection,
    priority: Priority,
    request_commit: bool,
    committed: AtomicBool,
    status: AtomicU8,
}

impl MotionTask {
    pub(crate) fn new(
        module: ModuleId,
        section: BodySection,
        priority: Priority,
        request_commit: bool,
    ) -> Self {
        Self {
            module,
            section,
            priority,
            request_commit,
            committed: AtomicBool::new(false),
            status: AtomicU8::new(TaskStatus::Pending as u8),
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn section(&self) -> BodySection {
        self.section
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_commit_requested(&self) -> bool {
        self.request_commit
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_committed(&self) {
        self.committed.store(true, Ordering::Release);
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// Handle returned to the submitter of a request.
#[derive(Debug, Clone)]
pub struct MotionRequest {
    pub(crate) head: Option<Arc<MotionTask>>,
    pub(crate) arms: Option<Arc<MotionTask>>,
    pub(crate) legs: Option<Arc<MotionTask>>,
}

impl MotionRequest {
    pub fn task(&self, section: BodySection) -> Option<&Arc<MotionTask>> {
        match section {
            BodySection::Head => self.head.as_ref(),
            BodySection::Arms => self.arms.as_ref(),
            BodySection::Legs => self.legs.as_ref(),
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<MotionTask>> {
        [&self.head, &self.arms, &self.legs]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    /// Aggregate status of the request's tasks.
    ///
    /// Any pending makes the request pending, then any selected makes it
    /// selected. Only a request whose tasks were all ignored is ignored;
    /// a request with no tasks counts as ignored too.
    pub fn status(&self) -> TaskStatus {
        let statuses: Vec<TaskStatus> = self.tasks().map(|t| t.status()).collect();
        if statuses.contains(&TaskStatus::Pending) {
            TaskStatus::Pending
        } else if statuses.contains(&TaskStatus::Selected) {
            TaskStatus::Selected
        } else if statuses.iter().all(|s| *s == TaskStatus::Ignored) {
            TaskStatus::Ignored
        } else {
            TaskStatus::Completed
        }
    }

    pub fn has_completed(&self) -> bool {
        self.status().is_terminal()
    }
}
