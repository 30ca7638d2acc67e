//! Robot configuration loading tests.
//!
//! Loads complete `motion.toml` files from a temp directory: section
//! defaults, joint entries, unknown field rejection and validation errors.

use bold_common::config::{ConfigError, RobotConfig};
use bold_common::hardware::config::LinkKind;
use bold_common::joint::JointId;
use bold_common::motion::config::SchedPolicy;
use std::fs;
use tempfile::TempDir;

const FULL_TOML: &str = r#"
[shared]
service_name = "darwin-3"
log_level = "debug"

[hardware]
driver = "serial"
device_path = "/dev/ttyUSB1"
baud_rate = 1000000
init_attempts = 5
init_retry_delay_ms = 100

[hardware.limits]
temperature_limit_c = 75
voltage_min = 9.5
voltage_max = 15.5

[[hardware.joints]]
joint = 7
offset = 12

[[hardware.joints]]
joint = 19
min_degrees = -135.0
max_degrees = 135.0

[motion]
period_ms = 8
rt_priority = 40
policy = "fifo"
power_check_interval = 30
failure_escalation = 250
cpu_core = 2
lock_memory = true
"#;

fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("motion.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn full_config_loads() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, FULL_TOML);

    let config = RobotConfig::load_validated(&path).unwrap();
    assert_eq!(config.shared.service_name, "darwin-3");
    assert_eq!(config.hardware.driver, LinkKind::Serial);
    assert_eq!(config.hardware.device_path, "/dev/ttyUSB1");
    assert_eq!(config.hardware.init_attempts, 5);
    assert_eq!(config.hardware.limits.temperature_limit_c, 75);
    assert_eq!(config.hardware.offset(JointId::R_HIP_YAW), 12);
    assert_eq!(
        config.hardware.joint(JointId::HEAD_PAN).and_then(|j| j.max_degrees),
        Some(135.0)
    );
    assert_eq!(config.motion.policy, SchedPolicy::Fifo);
    assert_eq!(config.motion.rt_priority, 40);
    assert_eq!(config.motion.cpu_core, Some(2));
    assert!(config.motion.lock_memory);
}

#[test]
fn partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[hardware]\ndriver = \"simulation\"\n");

    let config = RobotConfig::load_validated(&path).unwrap();
    assert_eq!(config.hardware.driver, LinkKind::Simulation);
    assert_eq!(config.hardware.device_path, "/dev/ttyUSB0");
    assert_eq!(config.motion.period_ms, 8);
    assert_eq!(config.motion.policy, SchedPolicy::RoundRobin);
}

#[test]
fn unknown_field_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[motion]\nperiod = 8\n");

    let result = RobotConfig::load_validated(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn joint_out_of_range_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[[hardware.joints]]\njoint = 21\noffset = 1\n");

    let result = RobotConfig::load_validated(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn invalid_priority_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[motion]\nrt_priority = 120\n");

    let result = RobotConfig::load_validated(&path);
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}
