//! Integration test: decision cycles driving the motion loop.
//!
//! M requests {head: Low, arms: High required commit, legs: High required
//! commit}, N requests {head: Normal}. The simulated actuators must end up
//! with N's head angle and M's arm and leg angles, and N only gets the arms
//! once M has finished.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use bold_cm730::registers::mx28::{self, Mx28Register};
use bold_cm730::{SimHandle, SimulatedBus};
use bold_common::joint::JointId;
use bold_motion::scheduler::TaskStatus;
use bold_motion::{ModuleRegistry, MotionLoop, Priority, Scheduler, SectionRequest, StateStore};

use super::{Pose, test_config};

const NONE: SectionRequest = SectionRequest::NONE;

fn goal(sim: &SimHandle, joint: JointId) -> u16 {
    sim.word(joint.id(), Mx28Register::GoalPositionL)
}

#[test]
fn head_and_body_driven_by_different_modules() {
    let mut modules = ModuleRegistry::new();
    let (m_pose, m_steps) = Pose::new(10.0);
    let m = modules.register("m", Box::new(m_pose.finishing_after(4)));
    let n = modules.register("n", Box::new(Pose::new(-10.0).0));

    let bus = SimulatedBus::new();
    let sim = bus.handle();
    let store = Arc::new(StateStore::new());
    let scheduler = Scheduler::new(Arc::clone(&store));
    let mut motion = MotionLoop::new(
        &test_config(),
        Some(Box::new(bus)),
        modules,
        Arc::clone(&store),
    );
    motion.step().unwrap();

    let m_request = scheduler.request(
        &m,
        SectionRequest::new(Priority::Low),
        SectionRequest::new(Priority::High).required().commit(),
        SectionRequest::new(Priority::High).required().commit(),
    );
    scheduler.request(&n, SectionRequest::new(Priority::Normal), NONE, NONE);
    scheduler.update();
    motion.step().unwrap();

    let plus = mx28::degs_to_value(10.0);
    let minus = mx28::degs_to_value(-10.0);
    assert_eq!(goal(&sim, JointId::HEAD_PAN), minus);
    assert_eq!(goal(&sim, JointId::L_ELBOW), plus);
    assert_eq!(goal(&sim, JointId::R_ANKLE_ROLL), plus);

    // N asks for the whole body while M is committed.
    let blocked = scheduler.request(
        &n,
        NONE,
        SectionRequest::new(Priority::High),
        SectionRequest::new(Priority::High),
    );
    scheduler.update();
    assert_eq!(blocked.status(), TaskStatus::Ignored);

    for _ in 0..10 {
        if m_steps.load(Ordering::SeqCst) >= 4 {
            break;
        }
        motion.step().unwrap();
        scheduler.update();
    }
    assert_eq!(m_steps.load(Ordering::SeqCst), 4);
    assert!(m_request.has_completed());
    assert_eq!(goal(&sim, JointId::L_ELBOW), plus);

    scheduler.request(
        &n,
        NONE,
        SectionRequest::new(Priority::High),
        SectionRequest::new(Priority::High),
    );
    scheduler.update();
    motion.step().unwrap();
    assert_eq!(goal(&sim, JointId::L_ELBOW), minus);
    assert_eq!(goal(&sim, JointId::R_ANKLE_ROLL), minus);
}
