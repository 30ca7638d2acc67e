//! Prelude module for common re-exports.
//!
//! ```rust
//! use bold_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, RobotConfig, SharedConfig};
pub use crate::hardware::config::{HardwareConfig, JointConfig, LinkKind, SafetyLimits};
pub use crate::motion::config::{MotionConfig, SchedPolicy};

// ─── Bus & Joints ───────────────────────────────────────────────────
pub use crate::consts::{BROADCAST_ID, CM730_ID, DEVICE_COUNT, JOINT_COUNT};
pub use crate::joint::{BodySection, JointId, JointSelection};
