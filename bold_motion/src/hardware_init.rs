//! One-time actuator setup after connecting.
//!
//! Writes the configured alarm masks, temperature and voltage limits and
//! optional angle limits to every actuator. Each write is retried up to
//! `init_attempts` times with a fixed backoff; a write that still fails is
//! logged and counted, and the remaining writes go ahead.

use bold_cm730::registers::mx28::{self, Mx28Register};
use bold_cm730::{Cm730, CommError, Mx28Alarm};
use bold_common::hardware::config::HardwareConfig;
use bold_common::joint::JointId;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of hardware initialisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub writes: usize,
    pub retries: usize,
    /// `(joint, register)` of every write that never succeeded.
    pub failed: Vec<(JointId, Mx28Register)>,
    /// Alarm bits reported by any actuator during setup.
    pub alarms: Mx28Alarm,
}

impl InitReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Value {
    Byte(u8),
    Word(u16),
}

/// Run `op` until it succeeds or `attempts` are used up.
fn with_retry<T>(
    attempts: u32,
    delay: Duration,
    retries: &mut usize,
    mut op: impl FnMut() -> Result<T, CommError>,
) -> Result<T, CommError> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts.max(1) => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, "retrying");
                *retries += 1;
                attempt += 1;
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }
    }
}

pub fn initialise_hardware(cm: &mut Cm730, config: &HardwareConfig) -> InitReport {
    let limits = &config.limits;
    let delay = Duration::from_millis(config.init_retry_delay_ms);
    let mut report = InitReport::default();

    for joint in JointId::all() {
        let mut writes = vec![
            (Mx28Register::AlarmLed, Value::Byte(limits.alarm_led)),
            (Mx28Register::AlarmShutdown, Value::Byte(limits.alarm_shutdown)),
            (
                Mx28Register::HighLimitTemperature,
                Value::Byte(limits.temperature_limit_c),
            ),
            (
                Mx28Register::LowLimitVoltage,
                Value::Byte(mx28::voltage_to_value(limits.voltage_min)),
            ),
            (
                Mx28Register::HighLimitVoltage,
                Value::Byte(mx28::voltage_to_value(limits.voltage_max)),
            ),
        ];
        if let Some(joint_config) = config.joint(joint) {
            if let Some(min) = joint_config.min_degrees {
                writes.push((Mx28Register::CwAngleLimitL, Value::Word(mx28::degs_to_value(min))));
            }
            if let Some(max) = joint_config.max_degrees {
                writes.push((Mx28Register::CcwAngleLimitL, Value::Word(mx28::degs_to_value(max))));
            }
        }

        for (register, value) in writes {
            report.writes += 1;
            let result = with_retry(config.init_attempts, delay, &mut report.retries, || {
                match &value {
                    Value::Byte(v) => cm.write_byte(joint.id(), register, *v),
                    Value::Word(v) => cm.write_word(joint.id(), register, *v),
                }
            });
            match result {
                Ok(alarm) => report.alarms |= alarm,
                Err(e) => {
                    warn!(joint = %joint, ?register, error = %e, "hardware init write failed");
                    report.failed.push((joint, register));
                }
            }
        }
    }

    if report.is_ok() {
        info!(writes = report.writes, retries = report.retries, "hardware initialised");
    } else {
        warn!(
            failed = report.failed.len(),
            writes = report.writes,
            "hardware initialised with failures"
        );
    }
    if report.alarms.has_error() {
        warn!(alarms = %report.alarms, "actuators report alarms");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use bold_cm730::SimulatedBus;
    use bold_common::hardware::config::JointConfig;

    fn config() -> HardwareConfig {
        HardwareConfig {
            init_attempts: 2,
            init_retry_delay_ms: 0,
            joints: vec![JointConfig {
                joint: JointId::HEAD_PAN,
                offset: 0,
                min_degrees: Some(-90.0),
                max_degrees: Some(90.0),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn writes_limits_to_every_joint() {
        let bus = SimulatedBus::new();
        let sim = bus.handle();
        let mut cm = Cm730::new(Box::new(bus));
        cm.connect().unwrap();

        let mut config = config();
        config.limits.temperature_limit_c = 70;
        config.limits.voltage_max = 14.0;
        let report = initialise_hardware(&mut cm, &config);

        assert!(report.is_ok());
        assert_eq!(report.writes, 20 * 5 + 2);
        assert_eq!(report.retries, 0);
        assert_eq!(sim.register(7, Mx28Register::HighLimitTemperature), 70);
        assert_eq!(sim.register(20, Mx28Register::HighLimitVoltage), 140);
        assert_eq!(sim.word(19, Mx28Register::CwAngleLimitL), 1024);
        assert_eq!(sim.word(19, Mx28Register::CcwAngleLimitL), 3072);
    }

    #[test]
    fn failures_are_bounded_and_reported() {
        let bus = SimulatedBus::new();
        let sim = bus.handle();
        let mut cm = Cm730::new(Box::new(bus));
        cm.connect().unwrap();
        sim.set_silent(true);

        let report = initialise_hardware(&mut cm, &config());
        assert_eq!(report.failed.len(), report.writes);
        assert_eq!(report.retries, report.writes);
    }

    #[test]
    fn retry_stops_at_first_success() {
        let mut calls = 0;
        let mut retries = 0;
        let result = with_retry(3, Duration::ZERO, &mut retries, || {
            calls += 1;
            if calls < 2 { Err(CommError::RxTimeout) } else { Ok(calls) }
        });
        assert_eq!(result, Ok(2));
        assert_eq!(retries, 1);
    }
}
