//! Hardware configuration types.
//!
//! - `HardwareConfig` - serial link, initialisation retry policy, per-joint setup
//! - `JointConfig` - calibration offset and angle limits for one joint
//! - `SafetyLimits` - temperature/voltage limits and alarm masks written at startup

use crate::config::ConfigError;
use crate::consts::DEFAULT_BAUD_RATE;
use crate::joint::JointId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

fn default_device_path() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_init_attempts() -> u32 {
    3
}

fn default_init_retry_delay_ms() -> u64 {
    500
}

fn default_temperature_limit() -> u8 {
    80
}

fn default_voltage_min() -> f64 {
    10.0
}

fn default_voltage_max() -> f64 {
    16.0
}

fn default_alarm_mask() -> u8 {
    // Overheating + overload.
    0x24
}

/// Which link backend the motion loop talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Real CM730 on a serial device.
    #[default]
    Serial,
    /// Wire-level simulated bus, no hardware needed.
    Simulation,
}

impl LinkKind {
    /// Name used for link registry lookup.
    pub const fn name(self) -> &'static str {
        match self {
            LinkKind::Serial => "serial",
            LinkKind::Simulation => "simulation",
        }
    }
}

/// Per-joint calibration and angle limits.
///
/// ```toml
/// [[hardware.joints]]
/// joint = 19
/// offset = 4
/// min_degrees = -135.0
/// max_degrees = 135.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointConfig {
    pub joint: JointId,
    /// Signed calibration offset added to the goal position at write time.
    #[serde(default)]
    pub offset: i16,
    #[serde(default)]
    pub min_degrees: Option<f64>,
    #[serde(default)]
    pub max_degrees: Option<f64>,
}

/// Limits written to every actuator during hardware initialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyLimits {
    /// Overheating alarm threshold [°C].
    #[serde(default = "default_temperature_limit")]
    pub temperature_limit_c: u8,
    /// Lower input voltage alarm threshold [V].
    #[serde(default = "default_voltage_min")]
    pub voltage_min: f64,
    /// Upper input voltage alarm threshold [V].
    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,
    /// Alarm bits that flash the actuator LED.
    #[serde(default = "default_alarm_mask")]
    pub alarm_led: u8,
    /// Alarm bits that cut actuator torque.
    #[serde(default = "default_alarm_mask")]
    pub alarm_shutdown: u8,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            temperature_limit_c: default_temperature_limit(),
            voltage_min: default_voltage_min(),
            voltage_max: default_voltage_max(),
            alarm_led: default_alarm_mask(),
            alarm_shutdown: default_alarm_mask(),
        }
    }
}

/// `[hardware]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardwareConfig {
    #[serde(default)]
    pub driver: LinkKind,

    /// Serial device of the CM730.
    #[serde(default = "default_device_path")]
    pub device_path: String,

    /// Link speed [bit/s].
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Attempts per register write during hardware initialisation.
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    /// Backoff between initialisation attempts [ms].
    #[serde(default = "default_init_retry_delay_ms")]
    pub init_retry_delay_ms: u64,

    #[serde(default)]
    pub limits: SafetyLimits,

    #[serde(default)]
    pub joints: Vec<JointConfig>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: LinkKind::default(),
            device_path: default_device_path(),
            baud_rate: default_baud_rate(),
            init_attempts: default_init_attempts(),
            init_retry_delay_ms: default_init_retry_delay_ms(),
            limits: SafetyLimits::default(),
            joints: Vec::new(),
        }
    }
}

impl HardwareConfig {
    /// Validate the hardware configuration.
    ///
    /// # Validation Rules
    /// 1. `baud_rate` > 0
    /// 2. `init_attempts` >= 1
    /// 3. `voltage_min` < `voltage_max`, both within 0..=25.5 V
    /// 4. each joint appears at most once, `min_degrees` < `max_degrees`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        if self.init_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "init_attempts must be at least 1".to_string(),
            ));
        }

        let limits = &self.limits;
        if !(0.0..=25.5).contains(&limits.voltage_min) || !(0.0..=25.5).contains(&limits.voltage_max)
        {
            return Err(ConfigError::ValidationError(format!(
                "voltage limits must be within 0..=25.5 V (got {}..{})",
                limits.voltage_min, limits.voltage_max
            )));
        }
        if limits.voltage_min >= limits.voltage_max {
            return Err(ConfigError::ValidationError(format!(
                "voltage_min ({}) must be below voltage_max ({})",
                limits.voltage_min, limits.voltage_max
            )));
        }
        if limits.alarm_shutdown & 0x80 != 0 || limits.alarm_led & 0x80 != 0 {
            warn!("alarm masks use bit 7, which actuators ignore");
        }

        let mut seen = HashSet::new();
        for joint in &self.joints {
            if !seen.insert(joint.joint) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate joint entry: {}",
                    joint.joint
                )));
            }
            if let (Some(min), Some(max)) = (joint.min_degrees, joint.max_degrees) {
                if min >= max {
                    return Err(ConfigError::ValidationError(format!(
                        "{}: min_degrees ({min}) must be below max_degrees ({max})",
                        joint.joint
                    )));
                }
            }
        }

        Ok(())
    }

    /// Calibration offset for a joint (0 if not configured).
    pub fn offset(&self, joint: JointId) -> i16 {
        self.joint(joint).map_or(0, |j| j.offset)
    }

    /// Configuration entry for a joint, if present.
    pub fn joint(&self, joint: JointId) -> Option<&JointConfig> {
        self.joints.iter().find(|j| j.joint == joint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = HardwareConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.driver, LinkKind::Serial);
        assert_eq!(config.limits.temperature_limit_c, 80);
    }

    #[test]
    fn parses_joint_entries() {
        let config: HardwareConfig = toml::from_str(
            r#"
driver = "simulation"

[[joints]]
joint = 19
offset = -7
min_degrees = -90.0
max_degrees = 90.0
"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.driver, LinkKind::Simulation);
        assert_eq!(config.offset(JointId::HEAD_PAN), -7);
        assert_eq!(config.offset(JointId::HEAD_TILT), 0);
    }

    #[test]
    fn duplicate_joint_rejected() {
        let mut config = HardwareConfig::default();
        for _ in 0..2 {
            config.joints.push(JointConfig {
                joint: JointId::R_KNEE,
                offset: 0,
                min_degrees: None,
                max_degrees: None,
            });
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn inverted_voltage_limits_rejected() {
        let mut config = HardwareConfig::default();
        config.limits.voltage_min = 16.0;
        config.limits.voltage_max = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_angle_limits_rejected() {
        let mut config = HardwareConfig::default();
        config.joints.push(JointConfig {
            joint: JointId::HEAD_TILT,
            offset: 0,
            min_degrees: Some(30.0),
            max_degrees: Some(-30.0),
        });
        assert!(config.validate().is_err());
    }
}
