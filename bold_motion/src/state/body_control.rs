//! Joint targets as last sent to the actuators.

use serde::Serialize;

use crate::body::BodyControl;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointTargetState {
    pub id: u8,
    pub value: u16,
    pub degrees: f64,
    pub offset: i16,
    pub p_gain: u8,
    pub i_gain: u8,
    pub d_gain: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyControlState {
    pub cycle: u64,
    pub joints: Vec<JointTargetState>,
}

impl BodyControlState {
    pub fn from_body(body: &BodyControl, cycle: u64) -> Self {
        let joints = body
            .joints()
            .map(|joint| JointTargetState {
                id: joint.id().id(),
                value: joint.value(),
                degrees: joint.degrees(),
                offset: body.offset(joint.id()),
                p_gain: joint.p_gain(),
                i_gain: joint.i_gain(),
                d_gain: joint.d_gain(),
            })
            .collect();
        Self { cycle, joints }
    }
}
