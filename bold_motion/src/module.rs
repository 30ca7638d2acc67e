//! Motion modules.
//!
//! A motion module produces joint targets for the body sections the
//! scheduler hands it. The motion thread calls [`MotionModule::step`] once
//! per cycle with the selection, then the `apply_*` method of each selected
//! section.
//!
//! Modules finish a committed task by returning [`StepOutcome::Completed`];
//! the motion thread raises the module's completion flag and the scheduler
//! releases its committed sections on the next update.

pub mod head_sweep;

pub use head_sweep::HeadSweep;

use bold_common::joint::JointSelection;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::body::{ArmSection, HeadSection, LegSection};

/// Result of one module step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepOutcome {
    #[default]
    Continue,
    /// The committed motion has finished.
    Completed,
}

/// Motion module driven by the motion thread.
pub trait MotionModule: Send {
    /// Called once before the first step.
    fn initialize(&mut self) {}

    /// Advance one cycle for the given sections.
    fn step(&mut self, selection: JointSelection) -> StepOutcome;

    fn apply_head(&mut self, head: &mut HeadSection<'_>);

    fn apply_arms(&mut self, arms: &mut ArmSection<'_>);

    fn apply_legs(&mut self, legs: &mut LegSection<'_>);
}

/// Registry-assigned module identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cheap, cloneable reference to a registered module.
///
/// Shared by the decision thread (submitting requests) and the motion
/// thread (signalling completion).
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    id: ModuleId,
    name: Arc<str>,
    completed: Arc<AtomicBool>,
}

impl ModuleHandle {
    fn new(id: ModuleId, name: &str) -> Self {
        Self {
            id,
            name: Arc::from(name),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn signal_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Test and clear the completion flag.
    pub fn take_completed(&self) -> bool {
        self.completed.swap(false, Ordering::AcqRel)
    }
}

/// Modules owned by the motion thread.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<(ModuleHandle, Box<dyn MotionModule>)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module and return its handle.
    ///
    /// # Panics
    /// Panics if a module with the same name is already registered.
    pub fn register(&mut self, name: &str, module: Box<dyn MotionModule>) -> ModuleHandle {
        if self.modules.iter().any(|(h, _)| h.name() == name) {
            panic!("Module '{name}' is already registered");
        }
        let handle = ModuleHandle::new(ModuleId(self.modules.len() as u32), name);
        self.modules.push((handle.clone(), module));
        handle
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ModuleHandle> {
        self.modules.iter().map(|(h, _)| h)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<(&ModuleHandle, &mut dyn MotionModule)> {
        self.modules
            .iter_mut()
            .find(|(h, _)| h.id == id)
            .map(|(h, m)| (&*h, m.as_mut() as &mut dyn MotionModule))
    }

    pub fn initialize_all(&mut self) {
        for (_, module) in &mut self.modules {
            module.initialize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl MotionModule for Idle {
        fn step(&mut self, _: JointSelection) -> StepOutcome {
            StepOutcome::Continue
        }
        fn apply_head(&mut self, _: &mut HeadSection<'_>) {}
        fn apply_arms(&mut self, _: &mut ArmSection<'_>) {}
        fn apply_legs(&mut self, _: &mut LegSection<'_>) {}
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut registry = ModuleRegistry::new();
        let a = registry.register("a", Box::new(Idle));
        let b = registry.register("b", Box::new(Idle));
        assert_eq!(a.id(), ModuleId(0));
        assert_eq!(b.id(), ModuleId(1));
        assert_eq!(b.name(), "b");
        assert!(registry.get_mut(ModuleId(1)).is_some());
        assert!(registry.get_mut(ModuleId(7)).is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_panics() {
        let mut registry = ModuleRegistry::new();
        registry.register("walk", Box::new(Idle));
        registry.register("walk", Box::new(Idle));
    }

    #[test]
    fn completion_flag_is_test_and_clear() {
        let mut registry = ModuleRegistry::new();
        let handle = registry.register("a", Box::new(Idle));
        let shared = handle.clone();
        assert!(!handle.take_completed());
        shared.signal_completed();
        assert!(handle.take_completed());
        assert!(!handle.take_completed());
    }
}
