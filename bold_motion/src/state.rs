//! Shared state store.
//!
//! The only channel between the motion thread and the decision thread.
//! Each state type has one slot holding the latest immutable `Arc<T>`;
//! publishing swaps the `Arc`, readers clone it.
//!
//! - [`HardwareState`] - decoded dynamic bulk read, every cycle
//! - [`StaticHardwareState`] - identity and settings, on demand
//! - [`BodyControlState`] - joint targets after a write
//! - [`MotionTaskState`] - scheduler selection for the motion thread
//! - [`MotionTimingState`] - per-step timings of the last cycle
//!
//! Observers register per slot with the thread they run on. Publishing marks
//! them dirty; [`StateStore::callback_observers`] collects the due observers
//! under the slot lock and calls them after releasing it.

pub mod body_control;
pub mod hardware;
pub mod motion_task;
pub mod timing;

pub use body_control::{BodyControlState, JointTargetState};
pub use hardware::{HardwareState, StaticHardwareState};
pub use motion_task::{ModuleAssignment, MotionTaskState, TaskSummary};
pub use timing::MotionTimingState;

use crate::cycle::StepTimer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread an observer callback runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverThread {
    Motion,
    Decision,
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Observer<T> {
    name: String,
    thread: ObserverThread,
    dirty: AtomicBool,
    callback: Callback<T>,
}

/// Latest value of one state type plus its observers.
pub struct Slot<T> {
    value: Mutex<Option<Arc<T>>>,
    observers: Mutex<Vec<Observer<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
        }
    }
}

/// A call collected while the observer list was locked.
type PendingCall = (String, Box<dyn FnOnce() + Send>);

impl<T: Send + Sync + 'static> Slot<T> {
    fn set(&self, value: Arc<T>) {
        *self.value.lock() = Some(value);
        for observer in self.observers.lock().iter() {
            observer.dirty.store(true, Ordering::Release);
        }
    }

    fn get(&self) -> Option<Arc<T>> {
        self.value.lock().clone()
    }

    fn due(&self, thread: ObserverThread, out: &mut Vec<PendingCall>) {
        let observers = self.observers.lock();
        if !observers
            .iter()
            .any(|o| o.thread == thread && o.dirty.load(Ordering::Acquire))
        {
            return;
        }
        let Some(value) = self.get() else {
            return;
        };
        for observer in observers.iter().filter(|o| o.thread == thread) {
            if observer.dirty.swap(false, Ordering::AcqRel) {
                let callback = Arc::clone(&observer.callback);
                let value = Arc::clone(&value);
                out.push((observer.name.clone(), Box::new(move || callback(&value))));
            }
        }
    }
}

/// Types that live in the store.
pub trait StoredState: Send + Sync + Sized + 'static {
    fn slot(store: &StateStore) -> &Slot<Self>;
}

macro_rules! stored_state {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl StoredState for $ty {
                fn slot(store: &StateStore) -> &Slot<Self> {
                    &store.$field
                }
            }
        )*
    };
}

stored_state! {
    HardwareState => hardware,
    StaticHardwareState => static_hardware,
    BodyControlState => body_control,
    MotionTaskState => motion_tasks,
    MotionTimingState => timing,
}

/// Typed state slots shared between threads via `Arc<StateStore>`.
#[derive(Default)]
pub struct StateStore {
    hardware: Slot<HardwareState>,
    static_hardware: Slot<StaticHardwareState>,
    body_control: Slot<BodyControlState>,
    motion_tasks: Slot<MotionTaskState>,
    timing: Slot<MotionTimingState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new value, replacing the previous one.
    pub fn set<T: StoredState>(&self, value: T) {
        T::slot(self).set(Arc::new(value));
    }

    /// Latest published value.
    pub fn get<T: StoredState>(&self) -> Option<Arc<T>> {
        T::slot(self).get()
    }

    /// Call `callback` on `thread` after each publish of `T`.
    pub fn register_observer<T: StoredState>(
        &self,
        name: impl Into<String>,
        thread: ObserverThread,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) {
        T::slot(self).observers.lock().push(Observer {
            name: name.into(),
            thread,
            dirty: AtomicBool::new(false),
            callback: Arc::new(callback),
        });
    }

    /// Run every observer of `thread` whose slot was published since its
    /// last call. Returns how many ran.
    pub fn callback_observers(&self, thread: ObserverThread, timer: &mut StepTimer) -> usize {
        let mut calls = Vec::new();
        self.hardware.due(thread, &mut calls);
        self.static_hardware.due(thread, &mut calls);
        self.body_control.due(thread, &mut calls);
        self.motion_tasks.due(thread, &mut calls);
        self.timing.due(thread, &mut calls);

        let count = calls.len();
        for (name, call) in calls {
            call();
            timer.event(name);
        }
        count
    }
}
