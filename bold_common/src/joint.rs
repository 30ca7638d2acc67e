//! Joint identity and body sections.
//!
//! Actuators are addressed on the bus by ids 1..=20. [`JointId`] only ever
//! holds a valid id, so arrays of per-joint data are indexed with
//! [`JointId::index`] and never carry an unused slot 0.
//!
//! ## Id layout
//!
//! | Ids | Section |
//! |-----|---------|
//! | 1–6 | arms |
//! | 7–18 | legs |
//! | 19–20 | head |

use crate::consts::{JOINT_COUNT, MAX_JOINT_ID, MIN_JOINT_ID};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated actuator id in `1..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct JointId(u8);

impl JointId {
    pub const R_SHOULDER_PITCH: Self = Self(1);
    pub const L_SHOULDER_PITCH: Self = Self(2);
    pub const R_SHOULDER_ROLL: Self = Self(3);
    pub const L_SHOULDER_ROLL: Self = Self(4);
    pub const R_ELBOW: Self = Self(5);
    pub const L_ELBOW: Self = Self(6);

    pub const R_HIP_YAW: Self = Self(7);
    pub const L_HIP_YAW: Self = Self(8);
    pub const R_HIP_ROLL: Self = Self(9);
    pub const L_HIP_ROLL: Self = Self(10);
    pub const R_HIP_PITCH: Self = Self(11);
    pub const L_HIP_PITCH: Self = Self(12);
    pub const R_KNEE: Self = Self(13);
    pub const L_KNEE: Self = Self(14);
    pub const R_ANKLE_PITCH: Self = Self(15);
    pub const L_ANKLE_PITCH: Self = Self(16);
    pub const R_ANKLE_ROLL: Self = Self(17);
    pub const L_ANKLE_ROLL: Self = Self(18);

    pub const HEAD_PAN: Self = Self(19);
    pub const HEAD_TILT: Self = Self(20);

    pub const MIN: Self = Self(MIN_JOINT_ID);
    pub const MAX: Self = Self(MAX_JOINT_ID);

    /// Validate a raw bus id.
    pub const fn new(id: u8) -> Option<Self> {
        if id >= MIN_JOINT_ID && id <= MAX_JOINT_ID {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Build from a zero-based array index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < JOINT_COUNT {
            Some(Self(index as u8 + 1))
        } else {
            None
        }
    }

    /// Raw bus id.
    #[inline]
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Zero-based array index.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Body section that owns this joint.
    pub const fn section(self) -> BodySection {
        match self.0 {
            1..=6 => BodySection::Arms,
            7..=18 => BodySection::Legs,
            _ => BodySection::Head,
        }
    }

    /// All joints in id order.
    pub fn all() -> impl Iterator<Item = JointId> {
        (MIN_JOINT_ID..=MAX_JOINT_ID).map(JointId)
    }

    /// Human-readable joint name.
    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "Shoulder Pitch Right",
            2 => "Shoulder Pitch Left",
            3 => "Shoulder Roll Right",
            4 => "Shoulder Roll Left",
            5 => "Elbow Right",
            6 => "Elbow Left",
            7 => "Hip Yaw Right",
            8 => "Hip Yaw Left",
            9 => "Hip Roll Right",
            10 => "Hip Roll Left",
            11 => "Hip Pitch Right",
            12 => "Hip Pitch Left",
            13 => "Knee Right",
            14 => "Knee Left",
            15 => "Ankle Pitch Right",
            16 => "Ankle Pitch Left",
            17 => "Ankle Roll Right",
            18 => "Ankle Roll Left",
            19 => "Head Pan",
            _ => "Head Tilt",
        }
    }
}

impl TryFrom<u8> for JointId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        JointId::new(value)
            .ok_or_else(|| format!("joint id {value} outside {MIN_JOINT_ID}..={MAX_JOINT_ID}"))
    }
}

impl From<JointId> for u8 {
    fn from(id: JointId) -> Self {
        id.0
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

// ─── Body Sections ──────────────────────────────────────────────────

/// Unit of control granularity arbitrated by the motion task scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySection {
    /// Pan and tilt.
    Head,
    /// Shoulders and elbows.
    Arms,
    /// Hips, knees and ankles.
    Legs,
}

impl BodySection {
    /// All sections in arbitration order.
    pub const ALL: [BodySection; 3] = [BodySection::Head, BodySection::Arms, BodySection::Legs];

    /// First and last joint of this section (inclusive).
    pub const fn joint_range(self) -> (JointId, JointId) {
        match self {
            BodySection::Head => (JointId::HEAD_PAN, JointId::HEAD_TILT),
            BodySection::Arms => (JointId::R_SHOULDER_PITCH, JointId::L_ELBOW),
            BodySection::Legs => (JointId::R_HIP_YAW, JointId::L_ANKLE_ROLL),
        }
    }

    /// Joints of this section in id order.
    pub fn joints(self) -> impl Iterator<Item = JointId> {
        let (min, max) = self.joint_range();
        (min.id()..=max.id()).map(JointId)
    }

    /// Selection containing only this section.
    pub const fn selection(self) -> JointSelection {
        match self {
            BodySection::Head => JointSelection::HEAD,
            BodySection::Arms => JointSelection::ARMS,
            BodySection::Legs => JointSelection::LEGS,
        }
    }

    /// Array slot for per-section storage.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BodySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BodySection::Head => "Head",
            BodySection::Arms => "Arms",
            BodySection::Legs => "Legs",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Set of body sections handed to a motion module for one cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JointSelection: u8 {
        const HEAD = 0b001;
        const ARMS = 0b010;
        const LEGS = 0b100;
    }
}

impl JointSelection {
    #[inline]
    pub const fn has_head(self) -> bool {
        self.contains(Self::HEAD)
    }

    #[inline]
    pub const fn has_arms(self) -> bool {
        self.contains(Self::ARMS)
    }

    #[inline]
    pub const fn has_legs(self) -> bool {
        self.contains(Self::LEGS)
    }

    /// True if the joint belongs to a selected section.
    pub const fn contains_joint(self, joint: JointId) -> bool {
        self.contains(joint.section().selection())
    }
}
