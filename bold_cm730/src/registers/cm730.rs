//! CM730 sub-controller control table and sensor conversions.

use std::f64::consts::PI;

/// Number of bytes in the control table.
pub const MAXNUM_ADDRESS: usize = 81;

/// Midpoint of the gyro and accelerometer ADCs.
pub const IMU_VALUE_MID: i32 = 512;

const RATIO_VALUE2DPS: f64 = 1600.0 / 512.0;
const RATIO_VALUE2RPS: f64 = (1600.0 * PI / 180.0) / 512.0;
const RATIO_VALUE2GS: f64 = 4.0 / 512.0;

/// Back panel LED bits.
pub const LED_PANEL_RED: u8 = 0x1;
pub const LED_PANEL_BLUE: u8 = 0x2;
pub const LED_PANEL_GREEN: u8 = 0x4;

/// Button register bits.
pub const BUTTON_MODE: u8 = 0x1;
pub const BUTTON_START: u8 = 0x2;

/// Control table addresses. Gaps are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Cm730Register {
    ModelNumberL = 0,
    ModelNumberH = 1,
    Version = 2,
    Id = 3,
    BaudRate = 4,
    ReturnDelayTime = 5,
    ReturnLevel = 16,
    DxlPower = 24,
    LedPanel = 25,
    LedHeadL = 26,
    LedHeadH = 27,
    LedEyeL = 28,
    LedEyeH = 29,
    Button = 30,
    GyroZL = 38,
    GyroZH = 39,
    GyroYL = 40,
    GyroYH = 41,
    GyroXL = 42,
    GyroXH = 43,
    AccelXL = 44,
    AccelXH = 45,
    AccelYL = 46,
    AccelYH = 47,
    AccelZL = 48,
    AccelZH = 49,
    Voltage = 50,
    LeftMicL = 51,
    LeftMicH = 52,
    Adc2L = 53,
    Adc2H = 54,
    Adc3L = 55,
    Adc3H = 56,
    Adc4L = 57,
    Adc4H = 58,
    Adc5L = 59,
    Adc5H = 60,
    Adc6L = 61,
    Adc6H = 62,
    Adc7L = 63,
    Adc7H = 64,
    Adc8L = 65,
    Adc8H = 66,
    RightMicL = 67,
    RightMicH = 68,
    Adc10L = 69,
    Adc10H = 70,
    Adc11L = 71,
    Adc11H = 72,
    Adc12L = 73,
    Adc12H = 74,
    Adc13L = 75,
    Adc13H = 76,
    Adc14L = 77,
    Adc14H = 78,
    Adc15L = 79,
    Adc15H = 80,
}

impl Cm730Register {
    #[inline]
    pub const fn address(self) -> u8 {
        self as u8
    }
}

impl From<Cm730Register> for u8 {
    fn from(r: Cm730Register) -> u8 {
        r as u8
    }
}

// ─── IMU ────────────────────────────────────────────────────────────

/// Gyro reading in degrees per second. 0 → -1600, 512 → 0, 1023 → +1600.
pub fn gyro_value_to_dps(value: u16) -> f64 {
    (value as i32 - IMU_VALUE_MID) as f64 * RATIO_VALUE2DPS
}

/// Gyro reading in radians per second.
pub fn gyro_value_to_rps(value: u16) -> f64 {
    (value as i32 - IMU_VALUE_MID) as f64 * RATIO_VALUE2RPS
}

/// Accelerometer reading in g. 0 → -4, 512 → 0, 1023 → +4.
pub fn acc_value_to_gs(value: u16) -> f64 {
    (value as i32 - IMU_VALUE_MID) as f64 * RATIO_VALUE2GS
}

/// Mirror an IMU reading around the ADC midpoint.
///
/// Used when a sensor is mounted reversed. Values above 1023 are clamped.
pub fn flip_imu_value(value: u16) -> u16 {
    match value.min(1023) {
        0 => 1023,
        v => 1023 - v + 1,
    }
}

// ─── LEDs ───────────────────────────────────────────────────────────

/// Pack an 8-bit RGB colour into the 15-bit `0bBBBBBGGGGGRRRRR` LED word.
pub const fn color_to_value(red: u8, green: u8, blue: u8) -> u16 {
    (((blue >> 3) as u16) << 10) | (((green >> 3) as u16) << 5) | ((red >> 3) as u16)
}

/// Unpack an LED word into RGB components in 0..=1.
pub fn value_to_colour(value: u16) -> [f64; 3] {
    [
        (value & 0x1F) as f64 / 31.0,
        ((value >> 5) & 0x1F) as f64 / 31.0,
        ((value >> 10) & 0x1F) as f64 / 31.0,
    ]
}

/// Supply voltage byte in volts.
pub fn value_to_voltage(value: u8) -> f64 {
    value as f64 * 0.1
}
