//! Decoded device state.
//!
//! - `Cm730Snapshot` / `Mx28Snapshot` - fast-changing registers, read every cycle
//! - `StaticCm730State` / `StaticMx28State` - identity and settings, read on demand
//!
//! All are built from a [`DeviceRegisterTable`] and fail if the table's
//! window does not cover a register they need.

use crate::error::TableError;
use crate::registers::alarm::Mx28Alarm;
use crate::registers::cm730::{self, Cm730Register as Cm};
use crate::registers::mx28::{self, Mx28Register as Mx};
use crate::table::DeviceRegisterTable;
use serde::Serialize;

/// Sub-controller state from the dynamic bulk read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cm730Snapshot {
    pub is_powered: bool,
    /// Red panel LED.
    pub is_led2_on: bool,
    /// Blue panel LED.
    pub is_led3_on: bool,
    /// Green panel LED.
    pub is_led4_on: bool,
    pub eye_colour: [f64; 3],
    pub forehead_colour: [f64; 3],
    pub is_mode_button_pressed: bool,
    pub is_start_button_pressed: bool,
    /// Gyro [x, y, z] in rad/s.
    pub gyro: [f64; 3],
    /// Accelerometer [x, y, z] in g.
    pub acc: [f64; 3],
    /// Raw gyro, 0..=1023 over ±1600 °/s.
    pub gyro_raw: [u16; 3],
    /// Raw accelerometer, 0..=1023 over ±4 g.
    pub acc_raw: [u16; 3],
    pub voltage: f64,
}

impl Cm730Snapshot {
    pub fn from_table(table: &DeviceRegisterTable) -> Result<Self, TableError> {
        let panel = table.read_byte(Cm::LedPanel)?;
        let buttons = table.read_byte(Cm::Button)?;
        let gyro_raw = [
            table.read_word(Cm::GyroXL)?,
            table.read_word(Cm::GyroYL)?,
            table.read_word(Cm::GyroZL)?,
        ];
        let acc_raw = [
            table.read_word(Cm::AccelXL)?,
            table.read_word(Cm::AccelYL)?,
            table.read_word(Cm::AccelZL)?,
        ];

        Ok(Self {
            is_powered: table.read_byte(Cm::DxlPower)? == 1,
            is_led2_on: panel & cm730::LED_PANEL_RED != 0,
            is_led3_on: panel & cm730::LED_PANEL_BLUE != 0,
            is_led4_on: panel & cm730::LED_PANEL_GREEN != 0,
            eye_colour: cm730::value_to_colour(table.read_word(Cm::LedEyeL)?),
            forehead_colour: cm730::value_to_colour(table.read_word(Cm::LedHeadL)?),
            is_mode_button_pressed: buttons & cm730::BUTTON_MODE != 0,
            is_start_button_pressed: buttons & cm730::BUTTON_START != 0,
            gyro: gyro_raw.map(cm730::gyro_value_to_rps),
            acc: acc_raw.map(cm730::acc_value_to_gs),
            gyro_raw,
            acc_raw,
            voltage: cm730::value_to_voltage(table.read_byte(Cm::Voltage)?),
        })
    }

    /// Gyro in hardware units centred on zero.
    pub fn balanced_gyro(&self) -> [i32; 3] {
        self.gyro_raw.map(|v| v as i32 - cm730::IMU_VALUE_MID)
    }
}

/// Actuator state from the dynamic bulk read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mx28Snapshot {
    pub id: u8,
    pub present_position_value: u16,
    /// Radians from centre.
    pub present_position: f64,
    pub present_speed_rpm: f64,
    /// Signed ratio of max torque.
    pub present_load: f64,
    pub present_voltage: f64,
    pub present_temp: u8,
    /// Error byte of the status packet.
    pub alarm: Mx28Alarm,
}

impl Mx28Snapshot {
    pub fn from_table(id: u8, table: &DeviceRegisterTable) -> Result<Self, TableError> {
        let position = table.read_word(Mx::PresentPositionL)?;
        Ok(Self {
            id,
            present_position_value: position,
            present_position: mx28::value_to_rads(position),
            present_speed_rpm: mx28::value_to_rpm(table.read_word(Mx::PresentSpeedL)?),
            present_load: mx28::value_to_load(table.read_word(Mx::PresentLoadL)?),
            present_voltage: mx28::value_to_voltage(table.read_byte(Mx::PresentVoltage)?),
            present_temp: table.read_byte(Mx::PresentTemperature)?,
            alarm: table.alarm(),
        })
    }
}

/// Sub-controller identity and settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticCm730State {
    pub model_number: u16,
    pub firmware_version: u8,
    pub dynamixel_id: u8,
    pub baud_bps: u32,
    pub return_delay_time_us: u32,
    /// 0: ping only, 1: reads only, 2: all instructions.
    pub status_ret_level: u8,
}

impl StaticCm730State {
    pub fn from_table(table: &DeviceRegisterTable) -> Result<Self, TableError> {
        Ok(Self {
            model_number: table.read_word(Cm::ModelNumberL)?,
            firmware_version: table.read_byte(Cm::Version)?,
            dynamixel_id: table.read_byte(Cm::Id)?,
            baud_bps: mx28::value_to_baud(table.read_byte(Cm::BaudRate)?),
            return_delay_time_us: mx28::value_to_return_delay_us(
                table.read_byte(Cm::ReturnDelayTime)?,
            ),
            status_ret_level: table.read_byte(Cm::ReturnLevel)?,
        })
    }
}

/// Actuator identity, EEPROM settings and RAM control values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticMx28State {
    pub model_number: u16,
    pub firmware_version: u8,
    pub id: u8,
    pub baud_bps: u32,
    pub return_delay_time_us: u32,
    /// Both limits zero means wheel mode.
    pub angle_limit_cw: f64,
    pub angle_limit_ccw: f64,
    pub temp_limit_high_celsius: u8,
    pub voltage_limit_low: f64,
    pub voltage_limit_high: f64,
    pub max_torque: f64,
    pub status_ret_level: u8,
    pub alarm_led: Mx28Alarm,
    pub alarm_shutdown: Mx28Alarm,
    pub torque_enable: bool,
    pub led: bool,
    pub gain_p: f64,
    pub gain_i: f64,
    pub gain_d: f64,
    pub goal_position_rads: f64,
    pub moving_speed_rpm: f64,
    pub torque_limit: f64,
    pub is_instruction_registered: bool,
    pub is_moving: bool,
    pub is_eeprom_locked: bool,
}

impl StaticMx28State {
    pub fn from_table(table: &DeviceRegisterTable) -> Result<Self, TableError> {
        Ok(Self {
            model_number: table.read_word(Mx::ModelNumberL)?,
            firmware_version: table.read_byte(Mx::Version)?,
            id: table.read_byte(Mx::Id)?,
            baud_bps: mx28::value_to_baud(table.read_byte(Mx::BaudRate)?),
            return_delay_time_us: mx28::value_to_return_delay_us(
                table.read_byte(Mx::ReturnDelayTime)?,
            ),
            angle_limit_cw: mx28::value_to_rads(table.read_word(Mx::CwAngleLimitL)?),
            angle_limit_ccw: mx28::value_to_rads(table.read_word(Mx::CcwAngleLimitL)?),
            temp_limit_high_celsius: table.read_byte(Mx::HighLimitTemperature)?,
            voltage_limit_low: mx28::value_to_voltage(table.read_byte(Mx::LowLimitVoltage)?),
            voltage_limit_high: mx28::value_to_voltage(table.read_byte(Mx::HighLimitVoltage)?),
            max_torque: mx28::value_to_max_torque(table.read_word(Mx::MaxTorqueL)?),
            status_ret_level: table.read_byte(Mx::ReturnLevel)?,
            alarm_led: Mx28Alarm::from_bits_truncate(table.read_byte(Mx::AlarmLed)?),
            alarm_shutdown: Mx28Alarm::from_bits_truncate(table.read_byte(Mx::AlarmShutdown)?),
            torque_enable: table.read_byte(Mx::TorqueEnable)? != 0,
            led: table.read_byte(Mx::Led)? != 0,
            gain_p: mx28::p_gain_to_display(table.read_byte(Mx::PGain)?),
            gain_i: mx28::i_gain_to_display(table.read_byte(Mx::IGain)?),
            gain_d: mx28::d_gain_to_display(table.read_byte(Mx::DGain)?),
            goal_position_rads: mx28::value_to_rads(table.read_word(Mx::GoalPositionL)?),
            moving_speed_rpm: mx28::value_to_rpm(table.read_word(Mx::MovingSpeedL)?),
            torque_limit: mx28::value_to_torque_limit(table.read_word(Mx::TorqueLimitL)?),
            is_instruction_registered: table.read_byte(Mx::RegisteredInstruction)? != 0,
            is_moving: table.read_byte(Mx::Moving)? != 0,
            is_eeprom_locked: table.read_byte(Mx::Lock)? != 0,
        })
    }
}
