//! Motion task scheduler.
//!
//! Decides, once per decision cycle, which module drives each body section.
//!
//! ## Resolution pass
//!
//! 1. Release committed tasks of modules that signalled completion.
//! 2. Stop if nothing changed since the last pass.
//! 3. Order tasks: committed first, then by priority. The sort is stable so
//!    the earliest submitter wins ties.
//! 4. Walk the order. A committed or independent task takes its section.
//!    A task with dependencies takes its section together with all of them,
//!    or none of them do and all are ignored.
//! 5. Group the winners per module.
//! 6. Commit winners that asked for it.
//! 7. Publish a [`MotionTaskState`].
//! 8. Complete non-committed winners and drop ignored tasks.
//!
//! A section marked `required` makes every other section of the same
//! request depend on it.

pub mod task;

pub use task::{MotionRequest, MotionTask, Priority, SectionRequest, TaskStatus};

use bold_common::joint::BodySection;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::module::{ModuleHandle, ModuleId};
use crate::state::{ModuleAssignment, MotionTaskState, StateStore, TaskSummary};

#[derive(Default)]
struct Inner {
    modules: Vec<ModuleHandle>,
    tasks: Vec<Arc<MotionTask>>,
    /// `(dependent, dependency)` pairs, valid for one pass only.
    dependencies: Vec<(Arc<MotionTask>, Arc<MotionTask>)>,
    has_change: bool,
}

pub struct Scheduler {
    inner: Mutex<Inner>,
    store: Arc<StateStore>,
}

type Winners = [Option<Arc<MotionTask>>; 3];

impl Scheduler {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            store,
        }
    }

    /// Make the scheduler watch `module`'s completion flag.
    pub fn register_module(&self, module: &ModuleHandle) {
        let mut inner = self.inner.lock();
        if !inner.modules.iter().any(|m| m.id() == module.id()) {
            inner.modules.push(module.clone());
        }
    }

    /// Submit a request for up to three sections.
    ///
    /// # Panics
    /// Panics if a section is `required` but not requested.
    pub fn request(
        &self,
        module: &ModuleHandle,
        head: SectionRequest,
        arms: SectionRequest,
        legs: SectionRequest,
    ) -> MotionRequest {
        let sections = [head, arms, legs];
        let mut created: Winners = [None, None, None];
        for (section, request) in BodySection::ALL.into_iter().zip(sections) {
            assert!(
                request.is_requested() || !request.required,
                "{} requested {section} as required with no priority",
                module.name()
            );
            if request.is_requested() {
                created[section.index()] = Some(Arc::new(MotionTask::new(
                    module.id(),
                    section,
                    request.priority,
                    request.commit,
                )));
            }
        }

        let mut inner = self.inner.lock();
        if !inner.modules.iter().any(|m| m.id() == module.id()) {
            inner.modules.push(module.clone());
        }
        for (required, request) in created.iter().zip(sections) {
            let Some(required) = required.as_ref().filter(|_| request.required) else {
                continue;
            };
            for dependent in created.iter().flatten() {
                if !Arc::ptr_eq(dependent, required) {
                    inner
                        .dependencies
                        .push((Arc::clone(dependent), Arc::clone(required)));
                }
            }
        }
        for task in created.iter().flatten() {
            inner.tasks.push(Arc::clone(task));
            inner.has_change = true;
        }
        debug!(
            module = module.name(),
            head = ?head.priority,
            arms = ?arms.priority,
            legs = ?legs.priority,
            "motion request"
        );

        let [head, arms, legs] = created;
        MotionRequest { head, arms, legs }
    }

    /// Run one resolution pass. Returns true if a new state was published.
    ///
    /// # Panics
    /// Panics if two committed tasks claim the same section.
    pub fn update(&self) -> bool {
        let mut guard = self.inner.lock();
        let Inner {
            modules,
            tasks,
            dependencies,
            has_change,
        } = &mut *guard;

        for module in modules.iter() {
            if !module.take_completed() {
                continue;
            }
            tasks.retain(|task| {
                if task.module() == module.id() && task.is_committed() {
                    task.set_status(TaskStatus::Completed);
                    *has_change = true;
                    false
                } else {
                    true
                }
            });
            debug!(module = module.name(), "module completed");
        }

        if !*has_change {
            return false;
        }

        let mut committed: [bool; 3] = [false; 3];
        for task in tasks.iter().filter(|t| t.is_committed()) {
            let slot = &mut committed[task.section().index()];
            assert!(!*slot, "two committed tasks for {}", task.section());
            *slot = true;
        }

        let mut pool = tasks.clone();
        sort_tasks(&mut pool);

        let mut winners: Winners = [None, None, None];
        while let Some(first) = pool.first().cloned() {
            if first.is_committed() {
                select(&first, &mut winners, &mut pool);
                continue;
            }
            let deps: Vec<Arc<MotionTask>> = dependencies
                .iter()
                .filter(|(dependent, _)| Arc::ptr_eq(dependent, &first))
                .map(|(_, dependency)| Arc::clone(dependency))
                .collect();
            let available = deps.iter().all(|dep| {
                winners[dep.section().index()]
                    .as_ref()
                    .is_none_or(|winner| Arc::ptr_eq(winner, dep))
            });
            if available {
                select(&first, &mut winners, &mut pool);
                for dep in &deps {
                    select(dep, &mut winners, &mut pool);
                }
            } else {
                // Dependencies that already won through another task keep their section.
                let is_winner = |task: &Arc<MotionTask>| {
                    winners[task.section().index()]
                        .as_ref()
                        .is_some_and(|w| Arc::ptr_eq(w, task))
                };
                first.set_status(TaskStatus::Ignored);
                for dep in deps.iter().filter(|d| !is_winner(d)) {
                    dep.set_status(TaskStatus::Ignored);
                }
                pool.retain(|t| !Arc::ptr_eq(t, &first) && !deps.iter().any(|d| Arc::ptr_eq(t, d)));
            }
        }

        let mut assignments: heapless::Vec<ModuleAssignment, 3> = heapless::Vec::new();
        for (section, winner) in BodySection::ALL.into_iter().zip(&winners) {
            let Some(winner) = winner else { continue };
            if let Some(existing) = assignments.iter_mut().find(|a| a.module == winner.module()) {
                existing.selection |= section.selection();
                continue;
            }
            // At most one entry per section.
            let _ = assignments.push(ModuleAssignment {
                module: winner.module(),
                name: module_name(modules, winner.module()),
                selection: section.selection(),
            });
        }

        for winner in winners.iter().flatten() {
            if winner.is_commit_requested() && !winner.is_committed() {
                winner.set_committed();
            }
        }

        for assignment in &assignments {
            trace!(module = %assignment.name, selection = ?assignment.selection, "assigned");
        }
        let [head, arms, legs] = &winners;
        self.store.set(MotionTaskState {
            assignments,
            head: head.as_deref().map(summary),
            arms: arms.as_deref().map(summary),
            legs: legs.as_deref().map(summary),
            tasks: tasks.iter().map(|t| summary(t)).collect(),
        });

        let mut completed_any = false;
        tasks.retain(|task| match task.status() {
            TaskStatus::Selected if !task.is_committed() => {
                task.set_status(TaskStatus::Completed);
                completed_any = true;
                false
            }
            TaskStatus::Ignored | TaskStatus::Completed => false,
            _ => true,
        });
        dependencies.clear();
        *has_change = completed_any;
        true
    }

    /// Tasks still held by the scheduler.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn has_change(&self) -> bool {
        self.inner.lock().has_change
    }
}

/// Committed tasks first, then by descending priority. Stable, so equal
/// tasks keep submission order.
fn sort_tasks(tasks: &mut [Arc<MotionTask>]) {
    tasks.sort_by(|a, b| {
        b.is_committed()
            .cmp(&a.is_committed())
            .then_with(|| b.priority().cmp(&a.priority()))
    });
}

/// Give `task` its section and ignore every other task for that section.
fn select(task: &Arc<MotionTask>, winners: &mut Winners, pool: &mut Vec<Arc<MotionTask>>) {
    let section = task.section();
    let slot = &mut winners[section.index()];
    debug_assert!(slot.as_ref().is_none_or(|w| Arc::ptr_eq(w, task)));
    task.set_status(TaskStatus::Selected);
    *slot = Some(Arc::clone(task));
    pool.retain(|other| {
        if other.section() != section {
            return true;
        }
        if !Arc::ptr_eq(other, task) {
            other.set_status(TaskStatus::Ignored);
        }
        false
    });
}

fn module_name(modules: &[ModuleHandle], id: ModuleId) -> Arc<str> {
    modules
        .iter()
        .find(|m| m.id() == id)
        .map_or_else(|| Arc::from(id.to_string()), ModuleHandle::shared_name)
}

fn summary(task: &MotionTask) -> TaskSummary {
    TaskSummary {
        module: task.module(),
        section: task.section(),
        priority: task.priority(),
        status: task.status(),
        committed: task.is_committed(),
    }
}
