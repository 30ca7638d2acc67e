//! Integration test: scheduler arbitration across decision cycles.
//!
//! Module M holds arms and legs as one committed unit while module N takes
//! the head, until M signals completion.

use std::sync::Arc;

use bold_common::joint::{BodySection, JointSelection};
use bold_motion::scheduler::TaskStatus;
use bold_motion::state::MotionTaskState;
use bold_motion::{ModuleRegistry, Priority, Scheduler, SectionRequest, StateStore};

use super::Pose;

const NONE: SectionRequest = SectionRequest::NONE;

fn setup() -> (Arc<StateStore>, Scheduler, ModuleRegistry) {
    let store = Arc::new(StateStore::new());
    let scheduler = Scheduler::new(Arc::clone(&store));
    (store, scheduler, ModuleRegistry::new())
}

fn m_request() -> (SectionRequest, SectionRequest, SectionRequest) {
    (
        SectionRequest::new(Priority::Low),
        SectionRequest::new(Priority::High).required().commit(),
        SectionRequest::new(Priority::High).required().commit(),
    )
}

#[test]
fn committed_module_holds_sections_until_completion() {
    let (store, scheduler, mut registry) = setup();
    let m = registry.register("m", Box::new(Pose::new(10.0).0));
    let n = registry.register("n", Box::new(Pose::new(-10.0).0));

    let (head, arms, legs) = m_request();
    let m_req = scheduler.request(&m, head, arms, legs);
    let n_req = scheduler.request(&n, SectionRequest::new(Priority::Normal), NONE, NONE);
    assert!(scheduler.update());

    // ── First pass: N takes the head, M takes arms and legs together ──
    let state = store.get::<MotionTaskState>().unwrap();
    assert_eq!(state.selection_for(n.id()), JointSelection::HEAD);
    assert_eq!(
        state.selection_for(m.id()),
        JointSelection::ARMS | JointSelection::LEGS
    );
    assert_eq!(m_req.task(BodySection::Head).unwrap().status(), TaskStatus::Ignored);
    assert!(m_req.task(BodySection::Arms).unwrap().is_committed());
    assert!(m_req.task(BodySection::Legs).unwrap().is_committed());
    assert_eq!(n_req.status(), TaskStatus::Completed);
    assert_eq!(m_req.status(), TaskStatus::Selected);

    // ── Later passes: N cannot take the committed sections ──
    for _ in 0..3 {
        let n_body = scheduler.request(
            &n,
            NONE,
            SectionRequest::new(Priority::High),
            SectionRequest::new(Priority::High),
        );
        assert!(scheduler.update());
        assert_eq!(n_body.status(), TaskStatus::Ignored);
        let state = store.get::<MotionTaskState>().unwrap();
        assert_eq!(
            state.selection_for(m.id()),
            JointSelection::ARMS | JointSelection::LEGS
        );
        assert!(state.arms.as_ref().unwrap().committed);
    }

    // ── M completes: its sections are released ──
    m.signal_completed();
    let n_body = scheduler.request(
        &n,
        NONE,
        SectionRequest::new(Priority::High),
        SectionRequest::new(Priority::High),
    );
    assert!(scheduler.update());
    assert_eq!(m_req.status(), TaskStatus::Completed);
    assert_eq!(n_body.status(), TaskStatus::Completed);
    let state = store.get::<MotionTaskState>().unwrap();
    assert_eq!(
        state.selection_for(n.id()),
        JointSelection::ARMS | JointSelection::LEGS
    );
    assert!(state.selection_for(m.id()).is_empty());
}

#[test]
fn winners_grouped_one_assignment_per_module() {
    let (store, scheduler, mut registry) = setup();
    let a = registry.register("a", Box::new(Pose::new(0.0).0));
    let b = registry.register("b", Box::new(Pose::new(0.0).0));

    let normal = SectionRequest::new(Priority::Normal);
    scheduler.request(&a, normal, NONE, normal);
    scheduler.request(&b, NONE, normal, NONE);
    scheduler.update();

    let state = store.get::<MotionTaskState>().unwrap();
    assert_eq!(state.assignments.len(), 2);
    assert_eq!(state.assignments[0].module, a.id());
    assert_eq!(
        state.assignments[0].selection,
        JointSelection::HEAD | JointSelection::LEGS
    );
    assert_eq!(&*state.assignments[0].name, "a");
    assert_eq!(state.assignments[1].selection, JointSelection::ARMS);
}

#[test]
fn observers_run_on_decision_thread_after_publish() {
    use bold_motion::ObserverThread;
    use bold_motion::cycle::StepTimer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let (store, scheduler, mut registry) = setup();
    let a = registry.register("a", Box::new(Pose::new(0.0).0));
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    store.register_observer::<MotionTaskState>("count", ObserverThread::Decision, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    let mut timer = StepTimer::new();
    assert_eq!(store.callback_observers(ObserverThread::Decision, &mut timer), 0);

    scheduler.request(&a, SectionRequest::new(Priority::Low), NONE, NONE);
    scheduler.update();
    assert_eq!(store.callback_observers(ObserverThread::Motion, &mut timer), 0);
    assert_eq!(store.callback_observers(ObserverThread::Decision, &mut timer), 1);
    assert_eq!(store.callback_observers(ObserverThread::Decision, &mut timer), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(timer.steps()[0].label, "count");
}
