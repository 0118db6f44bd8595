//! Door and flag bytes of the environment message
//!
//! | byte   | 0x01  | 0x02    | 0x04  | 0x08      | 0x10        | 0x20       | 0x40      | 0x80     |
//! |--------|-------|---------|-------|-----------|-------------|------------|-----------|----------|
//! | doors1 | FL    | FR      | port  | pilot     | charging    | -          | handbrake | car on   |
//! | doors2 | -     | -       | -     | locked    | valet       | headlights | bonnet    | trunk    |
//! | doors3 | awake | cooling | -     | -         | -           | -          | ctrl login| ctrl cfg |
//! | doors4 | -     | alarm   | -     | -         | -           | -          | -         | -        |
//! | doors5 | RL    | RR      | frunk | -         | charging 12V| -          | -         | HVAC     |
//!
//! Unassigned bits are always zero.

use ovms_core::metrics::standard::*;
use ovms_core::Metrics;

pub mod doors1 {
    pub const FRONT_LEFT: u8 = 0x01;
    pub const FRONT_RIGHT: u8 = 0x02;
    pub const CHARGE_PORT: u8 = 0x04;
    pub const PILOT_SIGNAL: u8 = 0x08;
    pub const CHARGING: u8 = 0x10;
    pub const HAND_BRAKE: u8 = 0x40;
    pub const CAR_ON: u8 = 0x80;
}

pub mod doors2 {
    pub const LOCKED: u8 = 0x08;
    pub const VALET: u8 = 0x10;
    pub const HEADLIGHTS: u8 = 0x20;
    pub const BONNET: u8 = 0x40;
    pub const TRUNK: u8 = 0x80;
}

pub mod doors3 {
    pub const AWAKE: u8 = 0x01;
    pub const COOLING_PUMP: u8 = 0x02;
    pub const CTRL_LOGGED_IN: u8 = 0x40;
    pub const CTRL_CFG_MODE: u8 = 0x80;
}

pub mod doors4 {
    pub const ALARM_SOUNDS: u8 = 0x02;
}

pub mod doors5 {
    pub const REAR_LEFT: u8 = 0x01;
    pub const REAR_RIGHT: u8 = 0x02;
    pub const FRUNK: u8 = 0x04;
    pub const CHARGING_12V: u8 = 0x10;
    pub const HVAC: u8 = 0x80;
}

/// OR together every bit whose flag is set
pub fn pack(bits: &[(u8, bool)]) -> u8 {
    bits.iter()
        .filter(|(_, set)| *set)
        .fold(0, |acc, (bit, _)| acc | bit)
}

pub fn is_set(byte: u8, bit: u8) -> bool {
    byte & bit != 0
}

fn flag(metrics: &Metrics, name: &str) -> bool {
    metrics.as_bool(name, false)
}

pub fn doors1(metrics: &Metrics) -> u8 {
    pack(&[
        (doors1::FRONT_LEFT, flag(metrics, V_DOOR_FL)),
        (doors1::FRONT_RIGHT, flag(metrics, V_DOOR_FR)),
        (doors1::CHARGE_PORT, flag(metrics, V_DOOR_CHARGEPORT)),
        (doors1::PILOT_SIGNAL, flag(metrics, V_CHARGE_PILOT)),
        (doors1::CHARGING, flag(metrics, V_CHARGE_INPROGRESS)),
        (doors1::HAND_BRAKE, flag(metrics, V_ENV_HANDBRAKE)),
        (doors1::CAR_ON, flag(metrics, V_ENV_ON)),
    ])
}

pub fn doors2(metrics: &Metrics) -> u8 {
    pack(&[
        (doors2::LOCKED, flag(metrics, V_ENV_LOCKED)),
        (doors2::VALET, flag(metrics, V_ENV_VALET)),
        (doors2::HEADLIGHTS, flag(metrics, V_ENV_HEADLIGHTS)),
        (doors2::BONNET, flag(metrics, V_DOOR_HOOD)),
        (doors2::TRUNK, flag(metrics, V_DOOR_TRUNK)),
    ])
}

pub fn doors3(metrics: &Metrics) -> u8 {
    pack(&[
        (doors3::AWAKE, flag(metrics, V_ENV_AWAKE)),
        (doors3::COOLING_PUMP, flag(metrics, V_ENV_COOLING)),
        (doors3::CTRL_LOGGED_IN, flag(metrics, V_ENV_CTRL_LOGIN)),
        (doors3::CTRL_CFG_MODE, flag(metrics, V_ENV_CTRL_CONFIG)),
    ])
}

pub fn doors4(metrics: &Metrics) -> u8 {
    pack(&[(doors4::ALARM_SOUNDS, flag(metrics, V_ENV_ALARM))])
}

pub fn doors5(metrics: &Metrics) -> u8 {
    pack(&[
        (doors5::REAR_LEFT, flag(metrics, V_DOOR_RL)),
        (doors5::REAR_RIGHT, flag(metrics, V_DOOR_RR)),
        // No frunk metric exists
        (doors5::FRUNK, false),
        (doors5::CHARGING_12V, flag(metrics, V_ENV_CHARGING12V)),
        (doors5::HVAC, flag(metrics, V_ENV_HVAC)),
    ])
}
