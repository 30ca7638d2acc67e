//! Integration test: TOML config to a running simulated body.

use std::io::Write;
use std::sync::Arc;

use bold_cm730::LinkRegistry;
use bold_common::config::RobotConfig;
use bold_common::hardware::config::LinkKind;
use bold_common::joint::JointId;
use bold_motion::state::HardwareState;
use bold_motion::{ModuleRegistry, MotionLoop, StateStore};
use tempfile::NamedTempFile;

const CONFIG_TOML: &str = r#"
[shared]
service_name = "bold-motion-test"

[hardware]
driver = "simulation"
init_attempts = 1
init_retry_delay_ms = 0

[hardware.limits]
temperature_limit_c = 70

[[hardware.joints]]
joint = 20
offset = -6

[motion]
period_ms = 8
power_check_interval = 2
"#;

#[test]
fn config_file_drives_link_and_offsets() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG_TOML.as_bytes()).unwrap();
    let config = RobotConfig::load_validated(file.path()).unwrap();
    assert_eq!(config.hardware.driver, LinkKind::Simulation);
    assert_eq!(config.hardware.offset(JointId::HEAD_TILT), -6);

    let link = LinkRegistry::with_defaults()
        .create(config.hardware.driver.name(), &config.hardware)
        .unwrap();
    let store = Arc::new(StateStore::new());
    let mut motion = MotionLoop::new(
        &config,
        Some(link),
        ModuleRegistry::new(),
        Arc::clone(&store),
    );

    // Cycle 2 runs the power check.
    motion.step().unwrap();
    motion.step().unwrap();

    let hw = store.get::<HardwareState>().unwrap();
    assert_eq!(hw.cycle, 2);
    assert!(hw.cm730.is_powered);
    let body = motion.motion_cycle().unwrap().body();
    assert_eq!(body.offset(JointId::HEAD_TILT), -6);
    assert_eq!(
        body.joint(JointId::HEAD_TILT).value() as i32,
        hw.joint(JointId::HEAD_TILT).present_position_value as i32 + 6
    );
}
