//! Hardware state decoded from bulk reads.

use bold_cm730::registers::alarm::Mx28Alarm;
use bold_cm730::registers::{cm730, mx28};
use bold_cm730::{
    BulkRead, Cm730Snapshot, Mx28Snapshot, StaticCm730State, StaticMx28State, TableError,
};
use bold_common::consts::CM730_ID;
use bold_common::joint::JointId;
use serde::Serialize;

use crate::body::{BodyControl, DebugControl};

/// Dynamic state of the whole body, published once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareState {
    pub cm730: Cm730Snapshot,
    /// Indexed by [`JointId::index`].
    pub mx28: Vec<Mx28Snapshot>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub cycle: u64,
}

impl HardwareState {
    pub fn from_bulk_read(
        bulk: &BulkRead,
        rx_bytes: u64,
        tx_bytes: u64,
        cycle: u64,
    ) -> Result<Self, TableError> {
        let cm730 = Cm730Snapshot::from_table(bulk.cm730())?;
        let mx28 = JointId::all()
            .map(|joint| Mx28Snapshot::from_table(joint.id(), bulk.joint(joint)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cm730,
            mx28,
            rx_bytes,
            tx_bytes,
            cycle,
        })
    }

    /// Hardware state of a body that tracks its targets perfectly, offsets
    /// included.
    pub fn fake(body: &BodyControl, debug: &DebugControl, cycle: u64) -> Self {
        let centred = cm730::IMU_VALUE_MID as u16;
        let cm730 = Cm730Snapshot {
            is_powered: true,
            is_led2_on: debug.is_red_panel_led_lit(),
            is_led3_on: debug.is_blue_panel_led_lit(),
            is_led4_on: debug.is_green_panel_led_lit(),
            eye_colour: cm730::value_to_colour(debug.eye_value()),
            forehead_colour: cm730::value_to_colour(debug.forehead_value()),
            is_mode_button_pressed: false,
            is_start_button_pressed: false,
            gyro: [cm730::gyro_value_to_rps(centred); 3],
            acc: [cm730::acc_value_to_gs(centred); 3],
            gyro_raw: [centred; 3],
            acc_raw: [centred; 3],
            voltage: 12.3,
        };
        let mx28 = body
            .joints()
            .map(|joint| {
                let offset = body.offset(joint.id()) as i32;
                let present = mx28::clamp_value(joint.value() as i32 + offset);
                Mx28Snapshot {
                    id: joint.id().id(),
                    present_position_value: present,
                    present_position: mx28::value_to_rads(present),
                    present_speed_rpm: 0.0,
                    present_load: 0.0,
                    present_voltage: 12.0,
                    present_temp: 40,
                    alarm: Mx28Alarm::empty(),
                }
            })
            .collect();
        Self {
            cm730,
            mx28,
            rx_bytes: 0,
            tx_bytes: 0,
            cycle,
        }
    }

    pub fn joint(&self, id: JointId) -> &Mx28Snapshot {
        &self.mx28[id.index()]
    }

    /// OR of the alarm bytes of every actuator.
    pub fn alarms(&self) -> Mx28Alarm {
        self.mx28
            .iter()
            .fold(Mx28Alarm::empty(), |acc, mx| acc | mx.alarm)
    }
}

/// Identity and settings of every device.
#[derive(Debug, Clone, Serialize)]
pub struct StaticHardwareState {
    pub cm730: StaticCm730State,
    /// Indexed by [`JointId::index`].
    pub mx28: Vec<StaticMx28State>,
}

impl StaticHardwareState {
    pub fn from_bulk_read(bulk: &BulkRead) -> Result<Self, TableError> {
        let cm730 = StaticCm730State::from_table(bulk.cm730())?;
        let mx28 = JointId::all()
            .map(|joint| StaticMx28State::from_table(bulk.joint(joint)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cm730, mx28 })
    }

    /// Settings reported when running without a body.
    pub fn fake() -> Self {
        let cm730 = StaticCm730State {
            model_number: 0x7300,
            firmware_version: 0x10,
            dynamixel_id: CM730_ID,
            baud_bps: 1_000_000,
            return_delay_time_us: 0,
            status_ret_level: 2,
        };
        let mx28 = JointId::all()
            .map(|joint| StaticMx28State {
                model_number: 0x001D,
                firmware_version: 0x20,
                id: joint.id(),
                baud_bps: 1_000_000,
                return_delay_time_us: 0,
                angle_limit_cw: mx28::value_to_rads(mx28::MIN_VALUE),
                angle_limit_ccw: mx28::value_to_rads(mx28::MAX_VALUE),
                temp_limit_high_celsius: 80,
                voltage_limit_low: 6.0,
                voltage_limit_high: 16.0,
                max_torque: 1.0,
                status_ret_level: 2,
                alarm_led: Mx28Alarm::empty(),
                alarm_shutdown: Mx28Alarm::empty(),
                torque_enable: true,
                led: false,
                gain_p: mx28::p_gain_to_display(32),
                gain_i: 0.0,
                gain_d: 0.0,
                goal_position_rads: 0.0,
                moving_speed_rpm: 0.0,
                torque_limit: 1.0,
                is_instruction_registered: false,
                is_moving: false,
                is_eeprom_locked: false,
            })
            .collect();
        Self { cm730, mx28 }
    }

    pub fn joint(&self, id: JointId) -> &StaticMx28State {
        &self.mx28[id.index()]
    }
}
