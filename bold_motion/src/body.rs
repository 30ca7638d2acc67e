//! Body joint model.
//!
//! [`BodyControl`] holds the target of every joint as motion modules leave
//! it. Each [`JointControl`] remembers which control table addresses changed
//! since the last transmit, so one sync write per cycle covers exactly the
//! union of changed ranges.
//!
//! ## Sync write record
//!
//! ```text
//! id, [D_GAIN], [I_GAIN], [P_GAIN], [RESERVED = 0], [GOAL_L, GOAL_H]
//! ```
//!
//! Only fields inside the common range are present. The goal position is
//! `value + offset`, clamped to the actuator range.

use bold_cm730::packet::{high_byte, low_byte};
use bold_cm730::registers::cm730::{self, Cm730Register};
use bold_cm730::registers::mx28::{self, Mx28Register};
use bold_common::consts::{CM730_ID, JOINT_COUNT, MAX_TX_PARAMS};
use bold_common::joint::{BodySection, JointId};
use static_assertions::const_assert;
use std::ops::{Deref, DerefMut};

use crate::state::HardwareState;

pub const P_GAIN_DEFAULT: u8 = 32;
pub const I_GAIN_DEFAULT: u8 = 0;
pub const D_GAIN_DEFAULT: u8 = 0;

/// D gain through goal position high byte.
const MAX_RECORD_BYTES: usize = 6;

// A full body sync write fits one instruction packet.
const_assert!(2 + JOINT_COUNT * (1 + MAX_RECORD_BYTES) <= MAX_TX_PARAMS);

// ─── Address Range ──────────────────────────────────────────────────

/// Inclusive range of control table addresses, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressRange {
    bounds: Option<(u8, u8)>,
}

impl AddressRange {
    pub const EMPTY: Self = Self { bounds: None };

    pub const fn span(min: u8, max: u8) -> Self {
        Self {
            bounds: Some((min, max)),
        }
    }

    pub const fn single(address: u8) -> Self {
        Self::span(address, address)
    }

    pub const fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn min(&self) -> Option<u8> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<u8> {
        self.bounds.map(|(_, max)| max)
    }

    /// Number of addresses covered.
    pub fn len(&self) -> usize {
        self.bounds
            .map_or(0, |(min, max)| (max - min) as usize + 1)
    }

    pub fn contains(&self, address: u8) -> bool {
        self.bounds
            .is_some_and(|(min, max)| (min..=max).contains(&address))
    }

    /// Grow to cover `other` as well.
    pub fn expand(&mut self, other: AddressRange) {
        self.bounds = match (self.bounds, other.bounds) {
            (None, b) | (b, None) => b,
            (Some((a_min, a_max)), Some((b_min, b_max))) => {
                Some((a_min.min(b_min), a_max.max(b_max)))
            }
        };
    }

    pub fn reset(&mut self) {
        self.bounds = None;
    }

    /// Addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = u8> {
        let (min, max) = self.bounds.unwrap_or((1, 0));
        min..=max
    }
}

const GOAL_POSITION: AddressRange = AddressRange::span(
    Mx28Register::GoalPositionL.address(),
    Mx28Register::GoalPositionH.address(),
);

// ─── Joint Control ──────────────────────────────────────────────────

/// Target position and gains of one actuator.
#[derive(Debug, Clone)]
pub struct JointControl {
    id: JointId,
    value: u16,
    degrees: f64,
    p_gain: u8,
    i_gain: u8,
    d_gain: u8,
    changed: AddressRange,
}

impl JointControl {
    pub fn new(id: JointId) -> Self {
        Self {
            id,
            value: mx28::CENTER_VALUE,
            degrees: 0.0,
            p_gain: P_GAIN_DEFAULT,
            i_gain: I_GAIN_DEFAULT,
            d_gain: D_GAIN_DEFAULT,
            changed: AddressRange::EMPTY,
        }
    }

    #[inline]
    pub fn id(&self) -> JointId {
        self.id
    }

    /// Raw target value, `0..=4095`.
    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Target angle in degrees.
    #[inline]
    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    pub fn radians(&self) -> f64 {
        self.degrees.to_radians()
    }

    /// Set the raw target. Values above the actuator range are clamped.
    pub fn set_value(&mut self, value: u16) {
        let value = mx28::clamp_value(value as i32);
        if value != self.value {
            self.value = value;
            self.changed.expand(GOAL_POSITION);
        }
        self.degrees = mx28::value_to_degs(value);
    }

    pub fn set_degrees(&mut self, degrees: f64) {
        let value = mx28::degs_to_value(degrees);
        if value != self.value {
            self.value = value;
            self.changed.expand(GOAL_POSITION);
        }
        self.degrees = degrees;
    }

    pub fn set_radians(&mut self, radians: f64) {
        self.set_degrees(radians.to_degrees());
    }

    pub fn p_gain(&self) -> u8 {
        self.p_gain
    }

    pub fn i_gain(&self) -> u8 {
        self.i_gain
    }

    pub fn d_gain(&self) -> u8 {
        self.d_gain
    }

    pub fn set_p_gain(&mut self, p: u8) {
        if p != self.p_gain {
            self.p_gain = p;
            self.changed.expand(AddressRange::single(Mx28Register::PGain.address()));
        }
    }

    pub fn set_i_gain(&mut self, i: u8) {
        if i != self.i_gain {
            self.i_gain = i;
            self.changed.expand(AddressRange::single(Mx28Register::IGain.address()));
        }
    }

    pub fn set_d_gain(&mut self, d: u8) {
        if d != self.d_gain {
            self.d_gain = d;
            self.changed.expand(AddressRange::single(Mx28Register::DGain.address()));
        }
    }

    pub fn set_pid_gains(&mut self, p: u8, i: u8, d: u8) {
        self.set_p_gain(p);
        self.set_i_gain(i);
        self.set_d_gain(d);
    }

    /// Addresses changed since the last transmit.
    pub fn modified_range(&self) -> AddressRange {
        self.changed
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn clear_dirty(&mut self) {
        self.changed.reset();
    }
}

// ─── Body Control ───────────────────────────────────────────────────

/// One sync write covering every dirty joint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWritePlan {
    pub from: u8,
    pub bytes_per_device: u8,
    pub device_count: u8,
    pub payload: Vec<u8>,
}

/// Targets of all 20 joints plus their calibration offsets.
#[derive(Debug, Clone)]
pub struct BodyControl {
    joints: [JointControl; JOINT_COUNT],
    offsets: [i16; JOINT_COUNT],
}

impl Default for BodyControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyControl {
    pub fn new() -> Self {
        Self {
            joints: std::array::from_fn(|i| {
                JointControl::new(JointId::from_index(i).unwrap_or(JointId::MIN))
            }),
            offsets: [0; JOINT_COUNT],
        }
    }

    pub fn joint(&self, id: JointId) -> &JointControl {
        &self.joints[id.index()]
    }

    pub fn joint_mut(&mut self, id: JointId) -> &mut JointControl {
        &mut self.joints[id.index()]
    }

    pub fn joints(&self) -> impl Iterator<Item = &JointControl> {
        self.joints.iter()
    }

    /// Calibration offset added to the goal position at write time.
    pub fn offset(&self, id: JointId) -> i16 {
        self.offsets[id.index()]
    }

    pub fn set_offset(&mut self, id: JointId, offset: i16) {
        self.offsets[id.index()] = offset;
    }

    /// Seed every target from the present positions and clear dirty flags.
    ///
    /// Offsets are removed so the next write reproduces the current pose.
    pub fn update_from_hardware_state(&mut self, hw: &HardwareState) {
        for (joint, offset) in self.joints.iter_mut().zip(self.offsets) {
            let present = hw.joint(joint.id).present_position_value as i32;
            joint.set_value(mx28::clamp_value(present - offset as i32));
            joint.clear_dirty();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.joints.iter().any(JointControl::is_dirty)
    }

    pub fn clear_dirty(&mut self) {
        self.joints.iter_mut().for_each(JointControl::clear_dirty);
    }

    /// Sync write for all dirty joints, or `None` when nothing changed.
    pub fn sync_write_plan(&self) -> Option<SyncWritePlan> {
        let mut range = AddressRange::EMPTY;
        let mut device_count = 0u8;
        for joint in self.joints.iter().filter(|j| j.is_dirty()) {
            range.expand(joint.changed);
            device_count += 1;
        }
        let from = range.min()?;
        let bytes_per_device = 1 + range.len();

        let mut payload = Vec::with_capacity(device_count as usize * bytes_per_device);
        for (joint, offset) in self.joints.iter().zip(self.offsets) {
            if !joint.is_dirty() {
                continue;
            }
            let goal = mx28::clamp_value(joint.value as i32 + offset as i32);
            payload.push(joint.id.id());
            for address in range.addresses() {
                payload.push(match address {
                    a if a == Mx28Register::DGain.address() => joint.d_gain,
                    a if a == Mx28Register::IGain.address() => joint.i_gain,
                    a if a == Mx28Register::PGain.address() => joint.p_gain,
                    a if a == Mx28Register::GoalPositionL.address() => low_byte(goal),
                    a if a == Mx28Register::GoalPositionH.address() => high_byte(goal),
                    _ => 0,
                });
            }
        }

        Some(SyncWritePlan {
            from,
            bytes_per_device: bytes_per_device as u8,
            device_count,
            payload,
        })
    }

    pub fn head(&mut self) -> HeadSection<'_> {
        HeadSection(self.section(BodySection::Head))
    }

    pub fn arms(&mut self) -> ArmSection<'_> {
        ArmSection(self.section(BodySection::Arms))
    }

    pub fn legs(&mut self) -> LegSection<'_> {
        LegSection(self.section(BodySection::Legs))
    }

    fn section(&mut self, section: BodySection) -> SectionControl<'_> {
        let (first, last) = section.joint_range();
        SectionControl {
            section,
            first,
            joints: &mut self.joints[first.index()..=last.index()],
        }
    }
}

// ─── Section Views ──────────────────────────────────────────────────

/// Mutable view of the joints of one body section.
pub struct SectionControl<'a> {
    section: BodySection,
    first: JointId,
    joints: &'a mut [JointControl],
}

impl SectionControl<'_> {
    pub fn section(&self) -> BodySection {
        self.section
    }

    pub fn visit_joints(&mut self, mut action: impl FnMut(&mut JointControl)) {
        self.joints.iter_mut().for_each(&mut action);
    }

    /// Joint by id, if it belongs to this section.
    pub fn joint(&mut self, id: JointId) -> Option<&mut JointControl> {
        if id.section() != self.section {
            return None;
        }
        self.joints.get_mut(id.index() - self.first.index())
    }

    fn pick(&mut self, id: JointId) -> &mut JointControl {
        &mut self.joints[id.index() - self.first.index()]
    }
}

macro_rules! section_view {
    ($name:ident, { $($accessor:ident => $joint:ident),* $(,)? }) => {
        pub struct $name<'a>(SectionControl<'a>);

        impl<'a> Deref for $name<'a> {
            type Target = SectionControl<'a>;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $name<'_> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl $name<'_> {
            $(
                pub fn $accessor(&mut self) -> &mut JointControl {
                    self.0.pick(JointId::$joint)
                }
            )*
        }
    };
}

section_view!(HeadSection, {
    pan => HEAD_PAN,
    tilt => HEAD_TILT,
});

section_view!(ArmSection, {
    shoulder_pitch_left => L_SHOULDER_PITCH,
    shoulder_pitch_right => R_SHOULDER_PITCH,
    shoulder_roll_left => L_SHOULDER_ROLL,
    shoulder_roll_right => R_SHOULDER_ROLL,
    elbow_left => L_ELBOW,
    elbow_right => R_ELBOW,
});

section_view!(LegSection, {
    hip_yaw_left => L_HIP_YAW,
    hip_yaw_right => R_HIP_YAW,
    hip_roll_left => L_HIP_ROLL,
    hip_roll_right => R_HIP_ROLL,
    hip_pitch_left => L_HIP_PITCH,
    hip_pitch_right => R_HIP_PITCH,
    knee_left => L_KNEE,
    knee_right => R_KNEE,
    ankle_pitch_left => L_ANKLE_PITCH,
    ankle_pitch_right => R_ANKLE_PITCH,
    ankle_roll_left => L_ANKLE_ROLL,
    ankle_roll_right => R_ANKLE_ROLL,
});

// ─── Debug Control ──────────────────────────────────────────────────

/// Panel LEDs and head colours of the CM730.
#[derive(Debug, Clone, Default)]
pub struct DebugControl {
    panel_led: u8,
    eye_colour: [u8; 3],
    forehead_colour: [u8; 3],
    eye_value: u16,
    forehead_value: u16,
    panel_dirty: bool,
    eye_dirty: bool,
    forehead_dirty: bool,
}

impl DebugControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.panel_dirty || self.eye_dirty || self.forehead_dirty
    }

    pub fn clear_dirty_flags(&mut self) {
        self.panel_dirty = false;
        self.eye_dirty = false;
        self.forehead_dirty = false;
    }

    pub fn set_panel_leds(&mut self, red: bool, blue: bool, green: bool) {
        let mut byte = 0;
        if red {
            byte |= cm730::LED_PANEL_RED;
        }
        if blue {
            byte |= cm730::LED_PANEL_BLUE;
        }
        if green {
            byte |= cm730::LED_PANEL_GREEN;
        }
        if byte != self.panel_led {
            self.panel_led = byte;
            self.panel_dirty = true;
        }
    }

    /// Eye colour as 8-bit RGB.
    pub fn set_eye_colour(&mut self, rgb: [u8; 3]) {
        let value = cm730::color_to_value(rgb[0], rgb[1], rgb[2]);
        if value != self.eye_value {
            self.eye_value = value;
            self.eye_colour = rgb;
            self.eye_dirty = true;
        }
    }

    /// Forehead colour as 8-bit RGB.
    pub fn set_forehead_colour(&mut self, rgb: [u8; 3]) {
        let value = cm730::color_to_value(rgb[0], rgb[1], rgb[2]);
        if value != self.forehead_value {
            self.forehead_value = value;
            self.forehead_colour = rgb;
            self.forehead_dirty = true;
        }
    }

    pub fn panel_led_byte(&self) -> u8 {
        self.panel_led
    }

    pub fn is_red_panel_led_lit(&self) -> bool {
        self.panel_led & cm730::LED_PANEL_RED != 0
    }

    pub fn is_blue_panel_led_lit(&self) -> bool {
        self.panel_led & cm730::LED_PANEL_BLUE != 0
    }

    pub fn is_green_panel_led_lit(&self) -> bool {
        self.panel_led & cm730::LED_PANEL_GREEN != 0
    }

    pub fn eye_colour(&self) -> [u8; 3] {
        self.eye_colour
    }

    pub fn forehead_colour(&self) -> [u8; 3] {
        self.forehead_colour
    }

    pub fn eye_value(&self) -> u16 {
        self.eye_value
    }

    pub fn forehead_value(&self) -> u16 {
        self.forehead_value
    }

    /// Single-device sync write of `LED_PANEL..=LED_EYE_H`.
    pub fn sync_write_plan(&self) -> SyncWritePlan {
        SyncWritePlan {
            from: Cm730Register::LedPanel.address(),
            bytes_per_device: 6,
            device_count: 1,
            payload: vec![
                CM730_ID,
                self.panel_led,
                low_byte(self.forehead_value),
                high_byte(self.forehead_value),
                low_byte(self.eye_value),
                high_byte(self.eye_value),
            ],
        }
    }
}
