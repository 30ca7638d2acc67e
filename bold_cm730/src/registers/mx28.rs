//! MX28 actuator control table and unit conversions.
//!
//! Addresses `0..=23` live in EEPROM, the rest in RAM. Two-byte values are
//! little-endian (`_L` at the lower address).

use std::f64::consts::PI;

/// Number of bytes in the control table.
pub const MAXNUM_ADDRESS: usize = 68;

pub const MIN_VALUE: u16 = 0x0000;
pub const CENTER_VALUE: u16 = 0x0800;
pub const MAX_VALUE: u16 = 0x0FFF;

pub const MIN_DEGS: f64 = -180.0;
pub const MAX_DEGS: f64 = 180.0;
pub const MIN_RADS: f64 = -PI;
pub const MAX_RADS: f64 = PI;

const RATIO_VALUE2DEGS: f64 = 360.0 / 4096.0;
const RATIO_DEGS2VALUE: f64 = 4096.0 / 360.0;
const RATIO_VALUE2RADS: f64 = (2.0 * PI) / 4096.0;
const RATIO_RADS2VALUE: f64 = 4096.0 / (2.0 * PI);
const RATIO_VALUE2RPM: f64 = 0.053;
const RATIO_RPM2VALUE: f64 = 18.87;
const RATIO_VALUE2TORQUE: f64 = 0.01;
const RATIO_TORQUE2VALUE: f64 = 100.0;

/// Direction bit of speed, load and torque words.
const DIRECTION_BIT: u16 = 0x400;

/// Control table addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Mx28Register {
    ModelNumberL = 0,
    ModelNumberH = 1,
    Version = 2,
    Id = 3,
    BaudRate = 4,
    ReturnDelayTime = 5,
    CwAngleLimitL = 6,
    CwAngleLimitH = 7,
    CcwAngleLimitL = 8,
    CcwAngleLimitH = 9,
    SystemData2 = 10,
    HighLimitTemperature = 11,
    LowLimitVoltage = 12,
    HighLimitVoltage = 13,
    MaxTorqueL = 14,
    MaxTorqueH = 15,
    ReturnLevel = 16,
    AlarmLed = 17,
    AlarmShutdown = 18,
    OperatingMode = 19,
    LowCalibrationL = 20,
    LowCalibrationH = 21,
    HighCalibrationL = 22,
    HighCalibrationH = 23,
    TorqueEnable = 24,
    Led = 25,
    DGain = 26,
    IGain = 27,
    PGain = 28,
    Reserved = 29,
    GoalPositionL = 30,
    GoalPositionH = 31,
    MovingSpeedL = 32,
    MovingSpeedH = 33,
    TorqueLimitL = 34,
    TorqueLimitH = 35,
    PresentPositionL = 36,
    PresentPositionH = 37,
    PresentSpeedL = 38,
    PresentSpeedH = 39,
    PresentLoadL = 40,
    PresentLoadH = 41,
    PresentVoltage = 42,
    PresentTemperature = 43,
    RegisteredInstruction = 44,
    PauseTime = 45,
    Moving = 46,
    Lock = 47,
    PunchL = 48,
    PunchH = 49,
    Reserved4 = 50,
    Reserved5 = 51,
    PotL = 52,
    PotH = 53,
    PwmOutL = 54,
    PwmOutH = 55,
    PErrorL = 56,
    PErrorH = 57,
    IErrorL = 58,
    IErrorH = 59,
    DErrorL = 60,
    DErrorH = 61,
    PErrorOutL = 62,
    PErrorOutH = 63,
    IErrorOutL = 64,
    IErrorOutH = 65,
    DErrorOutL = 66,
    DErrorOutH = 67,
}

impl Mx28Register {
    #[inline]
    pub const fn address(self) -> u8 {
        self as u8
    }
}

impl From<Mx28Register> for u8 {
    fn from(r: Mx28Register) -> u8 {
        r as u8
    }
}

// ─── Position ───────────────────────────────────────────────────────

pub fn clamp_value(value: i32) -> u16 {
    value.clamp(MIN_VALUE as i32, MAX_VALUE as i32) as u16
}

pub fn degs_to_value(degs: f64) -> u16 {
    clamp_value((degs * RATIO_DEGS2VALUE).round() as i32 + CENTER_VALUE as i32)
}

pub fn value_to_degs(value: u16) -> f64 {
    (value as f64 - CENTER_VALUE as f64) * RATIO_VALUE2DEGS
}

pub fn rads_to_value(rads: f64) -> u16 {
    clamp_value((rads * RATIO_RADS2VALUE).round() as i32 + CENTER_VALUE as i32)
}

pub fn value_to_rads(value: u16) -> f64 {
    (value as f64 - CENTER_VALUE as f64) * RATIO_VALUE2RADS
}

// ─── Speed, torque, load ────────────────────────────────────────────

pub fn rpm_to_value(rpm: f64) -> u16 {
    let mut value = ((rpm.abs() * RATIO_RPM2VALUE) as u16) & 0x3FF;
    if rpm < 0.0 {
        value |= DIRECTION_BIT;
    }
    value
}

pub fn value_to_rpm(value: u16) -> f64 {
    let rpm = (value & 0x3FF) as f64 * RATIO_VALUE2RPM;
    if value & DIRECTION_BIT != 0 { -rpm } else { rpm }
}

pub fn torque_to_value(torque: f64) -> u16 {
    let mut value = ((torque.abs() * RATIO_TORQUE2VALUE) as u16) & 0x3FF;
    if torque < 0.0 {
        value |= DIRECTION_BIT;
    }
    value
}

pub fn value_to_torque(value: u16) -> f64 {
    let torque = (value & 0x3FF) as f64 * RATIO_VALUE2TORQUE;
    if value & DIRECTION_BIT != 0 { -torque } else { torque }
}

/// Present load as a signed ratio of max torque.
///
/// Values below 1024 are counter-clockwise (positive).
pub fn value_to_load(value: u16) -> f64 {
    if value < 1024 {
        value as f64 / 1023.0
    } else {
        -((value - 1024) as f64 / 1023.0)
    }
}

// ─── EEPROM settings ────────────────────────────────────────────────

/// Present/limit voltage byte in volts.
pub fn value_to_voltage(value: u8) -> f64 {
    value as f64 * 0.1
}

/// Voltage limit in volts to register byte.
pub fn voltage_to_value(volts: f64) -> u8 {
    (volts * 10.0).round().clamp(0.0, 255.0) as u8
}

/// Baud rate register to bits per second.
pub fn value_to_baud(value: u8) -> u32 {
    2_000_000 / (value as u32 + 1)
}

/// Return delay register to microseconds.
pub fn value_to_return_delay_us(value: u8) -> u32 {
    value as u32 * 2
}

/// Max torque word as a ratio in 0..=1.
pub fn value_to_max_torque(value: u16) -> f64 {
    value as f64 / 0x3FF as f64
}

/// Torque limit word as a ratio in 0..=1.
pub fn value_to_torque_limit(value: u16) -> f64 {
    value as f64 / 1023.0
}

// ─── Gains ──────────────────────────────────────────────────────────

pub fn p_gain_to_display(value: u8) -> f64 {
    value as f64 / 8.0
}

pub fn i_gain_to_display(value: u8) -> f64 {
    value as f64 * 1000.0 / 2048.0
}

pub fn d_gain_to_display(value: u8) -> f64 {
    value as f64 * 4.0 / 1000.0
}
