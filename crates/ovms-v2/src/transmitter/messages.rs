//! Positional metric messages
//!
//! Each builder reads the metric store and returns one complete frame. Field
//! order and defaults are fixed by deployed servers and apps.

use ovms_core::metrics::standard::*;
use ovms_core::{Metrics, Unit};

use super::doors;
use crate::config::DistanceUnits;

/// Command codes this link answers with a real handler
pub const CAPABILITIES: &str = "C1-7,C10-12,C15-25,C41";

/// Metrics whose modification makes the stat message due
pub const STAT_METRICS: &[&str] = &[
    V_BAT_SOC,
    V_CHARGE_VOLTAGE,
    V_CHARGE_CURRENT,
    V_CHARGE_STATE,
    V_CHARGE_SUBSTATE,
    V_CHARGE_MODE,
    V_BAT_RANGE_IDEAL,
    V_BAT_RANGE_EST,
    V_CHARGE_CLIMIT,
    V_CHARGE_TIME,
    V_CHARGE_KWH,
    V_CHARGE_TIMERMODE,
    V_CHARGE_TIMERSTART,
    V_BAT_CAC,
    V_CHARGE_DURATION_FULL,
    V_CHARGE_DURATION_RANGE,
    V_CHARGE_DURATION_SOC,
    V_CHARGE_INPROGRESS,
    V_CHARGE_LIMIT_RANGE,
    V_CHARGE_LIMIT_SOC,
    V_ENV_COOLING,
    V_BAT_RANGE_FULL,
    V_BAT_POWER,
    V_BAT_VOLTAGE,
    V_BAT_SOH,
];

pub const GPS_METRICS: &[&str] = &[
    V_POS_LATITUDE,
    V_POS_LONGITUDE,
    V_POS_DIRECTION,
    V_POS_ALTITUDE,
    V_POS_GPSLOCK,
    V_POS_SPEED,
    V_ENV_DRIVEMODE,
    V_BAT_POWER,
    V_BAT_ENERGY_USED,
    V_BAT_ENERGY_RECD,
];

pub const TPMS_METRICS: &[&str] = &[
    V_TPMS_FL_T,
    V_TPMS_FR_T,
    V_TPMS_RL_T,
    V_TPMS_RR_T,
    V_TPMS_FL_P,
    V_TPMS_FR_P,
    V_TPMS_RL_P,
    V_TPMS_RR_P,
];

pub const FIRMWARE_METRICS: &[&str] = &[M_VERSION, V_VIN, M_NET_SQ, V_TYPE, M_NET_PROVIDER];

pub const ENVIRONMENT_METRICS: &[&str] = &[
    V_DOOR_FL,
    V_DOOR_FR,
    V_DOOR_CHARGEPORT,
    V_CHARGE_PILOT,
    V_CHARGE_INPROGRESS,
    V_ENV_HANDBRAKE,
    V_ENV_ON,
    V_ENV_LOCKED,
    V_ENV_VALET,
    V_ENV_HEADLIGHTS,
    V_DOOR_HOOD,
    V_DOOR_TRUNK,
    V_ENV_AWAKE,
    V_ENV_COOLING,
    V_ENV_CTRL_LOGIN,
    V_ENV_CTRL_CONFIG,
    V_ENV_ALARM,
    V_INV_TEMP,
    V_MOT_TEMP,
    V_BAT_TEMP,
    V_ENV_TEMP,
    V_BAT_12V_VOLTAGE,
    V_DOOR_RL,
    V_DOOR_RR,
    V_ENV_CHARGING12V,
    V_ENV_HVAC,
    V_CHARGE_TEMP,
];

pub const GROUP_METRICS: &[&str] = &[
    V_BAT_SOC,
    V_POS_SPEED,
    V_POS_DIRECTION,
    V_POS_ALTITUDE,
    V_POS_GPSLOCK,
    V_POS_LATITUDE,
    V_POS_LONGITUDE,
];

/// Position metrics whose staleness the location message reports
pub const GPS_STALE_METRICS: &[&str] =
    &[V_POS_LATITUDE, V_POS_LONGITUDE, V_POS_DIRECTION, V_POS_ALTITUDE];

/// Temperatures sharing the environment message's temperature stale flag
pub const TEMP_STALE_METRICS: &[&str] = &[V_INV_TEMP, V_MOT_TEMP, V_BAT_TEMP, V_CHARGE_TEMP];

pub fn chargestate_key(state: &str) -> i32 {
    match state {
        "charging" => 1,
        "topoff" => 2,
        "done" => 4,
        "prepare" => 5,
        "timerwait" => 13,
        "heating" => 14,
        "stopped" => 21,
        _ => 0,
    }
}

pub fn chargesubstate_key(substate: &str) -> i32 {
    match substate {
        "scheduledstop" => 1,
        "scheduledstart" => 2,
        "onrequest" => 3,
        "timerwait" => 7,
        "powerwait" => 10,
        "stopped" => 13,
        "interrupted" => 14,
        _ => 0,
    }
}

pub fn chargemode_key(mode: &str) -> i32 {
    match mode {
        "standard" => 0,
        "storage" => 1,
        "range" => 3,
        "performance" => 4,
        _ => 0,
    }
}

fn flag(metrics: &Metrics, name: &str) -> u8 {
    u8::from(metrics.as_bool(name, false))
}

fn text(metrics: &Metrics, name: &str) -> String {
    metrics.as_string(name, "0", None, None)
}

/// Whether any of `names` is stale
pub fn any_stale(metrics: &Metrics, names: &[&str]) -> bool {
    names.iter().any(|n| metrics.is_stale(n))
}

/// Whether every one of `names` is stale
pub fn all_stale(metrics: &Metrics, names: &[&str]) -> bool {
    names.iter().all(|n| metrics.is_stale(n))
}

/// `S`: battery and charge status
pub fn stat(metrics: &Metrics, units: DistanceUnits) -> String {
    let distance = Some(units.distance());
    let mins_range = metrics.as_int(V_CHARGE_DURATION_RANGE, 0, None);
    let mins_soc = metrics.as_int(V_CHARGE_DURATION_SOC, 0, None);
    let charging = metrics.as_bool(V_CHARGE_INPROGRESS, false);
    let state = metrics.as_string(V_CHARGE_STATE, "stopped", None, None);
    let mode = metrics.as_string(V_CHARGE_MODE, "standard", None, None);
    let substate = metrics.as_string(V_CHARGE_SUBSTATE, "", None, None);
    let charge_power = if charging {
        -metrics.as_float(V_BAT_POWER, 0.0, None)
    } else {
        0.0
    };
    let mins_estimate = if mins_range >= 0 && mins_range < mins_soc {
        mins_range
    } else {
        mins_soc
    };

    let fields: Vec<String> = vec![
        metrics.as_int(V_BAT_SOC, 0, None).to_string(),
        units.tag().to_string(),
        metrics.as_int(V_CHARGE_VOLTAGE, 0, None).to_string(),
        metrics.as_int(V_CHARGE_CURRENT, 0, None).to_string(),
        state.clone(),
        mode.clone(),
        metrics.as_int(V_BAT_RANGE_IDEAL, 0, distance).to_string(),
        metrics.as_int(V_BAT_RANGE_EST, 0, distance).to_string(),
        metrics.as_int(V_CHARGE_CLIMIT, 0, None).to_string(),
        metrics.as_int(V_CHARGE_TIME, 0, Some(Unit::Minutes)).to_string(),
        "0".to_string(),
        metrics.as_int(V_CHARGE_KWH, 0, None).to_string(),
        chargesubstate_key(&substate).to_string(),
        chargestate_key(&state).to_string(),
        chargemode_key(&mode).to_string(),
        flag(metrics, V_CHARGE_TIMERMODE).to_string(),
        metrics.as_int(V_CHARGE_TIMERSTART, 0, None).to_string(),
        "0".to_string(),
        format!("{:.2}", metrics.as_float(V_BAT_CAC, 0.0, None)),
        metrics.as_int(V_CHARGE_DURATION_FULL, 0, None).to_string(),
        mins_estimate.to_string(),
        (metrics.as_float(V_CHARGE_LIMIT_RANGE, 0.0, distance) as i64).to_string(),
        metrics.as_int(V_CHARGE_LIMIT_SOC, 0, None).to_string(),
        if metrics.as_bool(V_ENV_COOLING, false) { "0" } else { "-1" }.to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
        mins_range.to_string(),
        mins_soc.to_string(),
        metrics.as_int(V_BAT_RANGE_FULL, 0, distance).to_string(),
        "0".to_string(),
        format!("{:.2}", charge_power),
        format!("{:.2}", metrics.as_float(V_BAT_VOLTAGE, 0.0, None)),
        metrics.as_int(V_BAT_SOH, 0, None).to_string(),
    ];
    format!("MP-0 S{}", fields.join(","))
}

/// `L`: position and drive status
pub fn location(metrics: &Metrics, units: DistanceUnits) -> String {
    let stale = any_stale(metrics, GPS_STALE_METRICS);
    let speed = match units {
        DistanceUnits::Kilometers => metrics.as_string(V_POS_SPEED, "0", None, None),
        DistanceUnits::Miles => metrics.as_string(V_POS_SPEED, "0", Some(Unit::Mph), None),
    };
    // Printed the way a C int is printed with %x
    let drivemode = metrics.as_int(V_ENV_DRIVEMODE, 0, None) as i32 as u32;

    format!(
        "MP-0 L{},{},{},{},{},{},{},{:x},{},{},{}",
        metrics.as_string(V_POS_LATITUDE, "0", None, Some(6)),
        metrics.as_string(V_POS_LONGITUDE, "0", None, Some(6)),
        text(metrics, V_POS_DIRECTION),
        text(metrics, V_POS_ALTITUDE),
        flag(metrics, V_POS_GPSLOCK),
        if stale { 0 } else { 1 },
        speed,
        drivemode,
        metrics.as_string(V_BAT_POWER, "0", None, Some(1)),
        metrics.as_string(V_BAT_ENERGY_USED, "0", None, Some(0)),
        metrics.as_string(V_BAT_ENERGY_RECD, "0", None, Some(0)),
    )
}

/// `W`: tyre pressures (psi) and temperatures
pub fn tpms(metrics: &Metrics) -> String {
    let psi = |name| metrics.as_string(name, "0", Some(Unit::Psi), None);
    let stale = any_stale(metrics, TPMS_METRICS);
    format!(
        "MP-0 W{},{},{},{},{},{},{},{},{}",
        psi(V_TPMS_FR_P),
        text(metrics, V_TPMS_FR_T),
        psi(V_TPMS_RR_P),
        text(metrics, V_TPMS_RR_T),
        psi(V_TPMS_FL_P),
        text(metrics, V_TPMS_FL_T),
        psi(V_TPMS_RL_P),
        text(metrics, V_TPMS_RL_T),
        if stale { 0 } else { 1 },
    )
}

/// `F`: firmware, identity and signal
pub fn firmware(metrics: &Metrics) -> String {
    format!(
        "MP-0 F{},{},{},1,{},{}",
        metrics.as_string(M_VERSION, "", None, None),
        metrics.as_string(V_VIN, "", None, None),
        metrics.as_string(M_NET_SQ, "0", Some(Unit::Sq), None),
        metrics.as_string(V_TYPE, "", None, None),
        metrics.as_string(M_NET_PROVIDER, "", None, None),
    )
}

/// `D`: doors, temperatures, odometer and 12V system
pub fn environment(metrics: &Metrics, units: DistanceUnits) -> String {
    let distance = Some(units.distance());
    // One valid temperature makes them all valid
    let stale_temps = all_stale(metrics, TEMP_STALE_METRICS);
    let tenths = |name| (metrics.as_float(name, 0.0, distance) * 10.0) as i64;

    let fields: Vec<String> = vec![
        doors::doors1(metrics).to_string(),
        doors::doors2(metrics).to_string(),
        if metrics.as_bool(V_ENV_LOCKED, false) { "4" } else { "5" }.to_string(),
        text(metrics, V_INV_TEMP),
        text(metrics, V_MOT_TEMP),
        text(metrics, V_BAT_TEMP),
        tenths(V_POS_TRIP).to_string(),
        tenths(V_POS_ODOMETER).to_string(),
        text(metrics, V_POS_SPEED),
        text(metrics, M_MONOTONIC),
        text(metrics, V_ENV_TEMP),
        doors::doors3(metrics).to_string(),
        if stale_temps { "0" } else { "1" }.to_string(),
        if metrics.is_stale(V_ENV_TEMP) { "0" } else { "1" }.to_string(),
        text(metrics, V_BAT_12V_VOLTAGE),
        doors::doors4(metrics).to_string(),
        "0".to_string(),
        doors::doors5(metrics).to_string(),
        text(metrics, V_CHARGE_TEMP),
        text(metrics, V_BAT_12V_CURRENT),
    ];
    format!("MP-0 D{}", fields.join(","))
}

/// `g`: one position summary per configured group
pub fn groups(metrics: &Metrics, units: DistanceUnits, names: &[String]) -> Vec<String> {
    if names.is_empty() {
        return Vec::new();
    }
    let stale = any_stale(metrics, GPS_STALE_METRICS);
    let summary = format!(
        "{},{},{},{},{},{},{},{}",
        metrics.as_int(V_BAT_SOC, 0, None),
        metrics.as_string(V_POS_SPEED, "0", Some(units.speed()), None),
        text(metrics, V_POS_DIRECTION),
        text(metrics, V_POS_ALTITUDE),
        flag(metrics, V_POS_GPSLOCK),
        if stale { 0 } else { 1 },
        metrics.as_string(V_POS_LATITUDE, "0", None, Some(6)),
        metrics.as_string(V_POS_LONGITUDE, "0", None, Some(6)),
    );
    names
        .iter()
        .map(|name| format!("MP-0 g{},{}", name, summary))
        .collect()
}

/// `V`: supported command codes
pub fn capabilities() -> String {
    format!("MP-0 V{}", CAPABILITIES)
}
