//! Standard metric names
//!
//! Names follow the dotted OVMS scheme: `v.` vehicle, `m.` module,
//! `s.` server. The table at the bottom assigns each one its native unit.

use super::Unit;

// Module
pub const M_VERSION: &str = "m.version";
pub const M_MONOTONIC: &str = "m.monotonic";
pub const M_NET_SQ: &str = "m.net.sq";
pub const M_NET_PROVIDER: &str = "m.net.provider";

// Server link
pub const S_V2_CONNECTED: &str = "s.v2.connected";
pub const S_V2_PEERS: &str = "s.v2.peers";

// Identity
pub const V_VIN: &str = "v.vin";
pub const V_TYPE: &str = "v.type";

// Battery
pub const V_BAT_SOC: &str = "v.b.soc";
pub const V_BAT_SOH: &str = "v.b.soh";
pub const V_BAT_CAC: &str = "v.b.cac";
pub const V_BAT_VOLTAGE: &str = "v.b.voltage";
pub const V_BAT_POWER: &str = "v.b.power";
pub const V_BAT_ENERGY_USED: &str = "v.b.energy.used";
pub const V_BAT_ENERGY_RECD: &str = "v.b.energy.recd";
pub const V_BAT_RANGE_FULL: &str = "v.b.range.full";
pub const V_BAT_RANGE_IDEAL: &str = "v.b.range.ideal";
pub const V_BAT_RANGE_EST: &str = "v.b.range.est";
pub const V_BAT_12V_VOLTAGE: &str = "v.b.12v.voltage";
pub const V_BAT_12V_CURRENT: &str = "v.b.12v.current";
pub const V_BAT_TEMP: &str = "v.b.temp";

// Charging
pub const V_CHARGE_VOLTAGE: &str = "v.c.voltage";
pub const V_CHARGE_CURRENT: &str = "v.c.current";
pub const V_CHARGE_CLIMIT: &str = "v.c.climit";
pub const V_CHARGE_TIME: &str = "v.c.time";
pub const V_CHARGE_KWH: &str = "v.c.kwh";
pub const V_CHARGE_MODE: &str = "v.c.mode";
pub const V_CHARGE_TIMERMODE: &str = "v.c.timermode";
pub const V_CHARGE_TIMERSTART: &str = "v.c.timerstart";
pub const V_CHARGE_STATE: &str = "v.c.state";
pub const V_CHARGE_SUBSTATE: &str = "v.c.substate";
pub const V_CHARGE_PILOT: &str = "v.c.pilot";
pub const V_CHARGE_INPROGRESS: &str = "v.c.inprogress";
pub const V_CHARGE_LIMIT_RANGE: &str = "v.c.limit.range";
pub const V_CHARGE_LIMIT_SOC: &str = "v.c.limit.soc";
pub const V_CHARGE_DURATION_FULL: &str = "v.c.duration.full";
pub const V_CHARGE_DURATION_RANGE: &str = "v.c.duration.range";
pub const V_CHARGE_DURATION_SOC: &str = "v.c.duration.soc";
pub const V_CHARGE_TEMP: &str = "v.c.temp";

// Drivetrain
pub const V_INV_TEMP: &str = "v.i.temp";
pub const V_MOT_TEMP: &str = "v.m.temp";

// Doors
pub const V_DOOR_FL: &str = "v.d.fl";
pub const V_DOOR_FR: &str = "v.d.fr";
pub const V_DOOR_RL: &str = "v.d.rl";
pub const V_DOOR_RR: &str = "v.d.rr";
pub const V_DOOR_CHARGEPORT: &str = "v.d.cp";
pub const V_DOOR_HOOD: &str = "v.d.hood";
pub const V_DOOR_TRUNK: &str = "v.d.trunk";

// Environment
pub const V_ENV_DRIVEMODE: &str = "v.e.drivemode";
pub const V_ENV_HANDBRAKE: &str = "v.e.handbrake";
pub const V_ENV_ON: &str = "v.e.on";
pub const V_ENV_AWAKE: &str = "v.e.awake";
pub const V_ENV_COOLING: &str = "v.e.cooling";
pub const V_ENV_HEATING: &str = "v.e.heating";
pub const V_ENV_HVAC: &str = "v.e.hvac";
pub const V_ENV_LOCKED: &str = "v.e.locked";
pub const V_ENV_VALET: &str = "v.e.valet";
pub const V_ENV_HEADLIGHTS: &str = "v.e.headlights";
pub const V_ENV_ALARM: &str = "v.e.alarm";
pub const V_ENV_CTRL_LOGIN: &str = "v.e.c.login";
pub const V_ENV_CTRL_CONFIG: &str = "v.e.c.config";
pub const V_ENV_CHARGING12V: &str = "v.e.charging12v";
pub const V_ENV_TEMP: &str = "v.e.temp";

// Position
pub const V_POS_GPSLOCK: &str = "v.p.gpslock";
pub const V_POS_LATITUDE: &str = "v.p.latitude";
pub const V_POS_LONGITUDE: &str = "v.p.longitude";
pub const V_POS_DIRECTION: &str = "v.p.direction";
pub const V_POS_ALTITUDE: &str = "v.p.altitude";
pub const V_POS_SPEED: &str = "v.p.speed";
pub const V_POS_ODOMETER: &str = "v.p.odometer";
pub const V_POS_TRIP: &str = "v.p.trip";

// Tyres
pub const V_TPMS_FL_T: &str = "v.tp.fl.t";
pub const V_TPMS_FR_T: &str = "v.tp.fr.t";
pub const V_TPMS_RL_T: &str = "v.tp.rl.t";
pub const V_TPMS_RR_T: &str = "v.tp.rr.t";
pub const V_TPMS_FL_P: &str = "v.tp.fl.p";
pub const V_TPMS_FR_P: &str = "v.tp.fr.p";
pub const V_TPMS_RL_P: &str = "v.tp.rl.p";
pub const V_TPMS_RR_P: &str = "v.tp.rr.p";

/// Every standard metric with its native unit
pub const STANDARD_METRICS: &[(&str, Unit)] = &[
    (M_VERSION, Unit::Other),
    (M_MONOTONIC, Unit::Seconds),
    (M_NET_SQ, Unit::Dbm),
    (M_NET_PROVIDER, Unit::Other),
    (S_V2_CONNECTED, Unit::Other),
    (S_V2_PEERS, Unit::Other),
    (V_VIN, Unit::Other),
    (V_TYPE, Unit::Other),
    (V_BAT_SOC, Unit::Percentage),
    (V_BAT_SOH, Unit::Percentage),
    (V_BAT_CAC, Unit::AmpHours),
    (V_BAT_VOLTAGE, Unit::Volts),
    (V_BAT_POWER, Unit::Kw),
    (V_BAT_ENERGY_USED, Unit::Kwh),
    (V_BAT_ENERGY_RECD, Unit::Kwh),
    (V_BAT_RANGE_FULL, Unit::Kilometers),
    (V_BAT_RANGE_IDEAL, Unit::Kilometers),
    (V_BAT_RANGE_EST, Unit::Kilometers),
    (V_BAT_12V_VOLTAGE, Unit::Volts),
    (V_BAT_12V_CURRENT, Unit::Amps),
    (V_BAT_TEMP, Unit::Celcius),
    (V_CHARGE_VOLTAGE, Unit::Volts),
    (V_CHARGE_CURRENT, Unit::Amps),
    (V_CHARGE_CLIMIT, Unit::Amps),
    (V_CHARGE_TIME, Unit::Seconds),
    (V_CHARGE_KWH, Unit::Kwh),
    (V_CHARGE_MODE, Unit::Other),
    (V_CHARGE_TIMERMODE, Unit::Other),
    (V_CHARGE_TIMERSTART, Unit::Other),
    (V_CHARGE_STATE, Unit::Other),
    (V_CHARGE_SUBSTATE, Unit::Other),
    (V_CHARGE_PILOT, Unit::Other),
    (V_CHARGE_INPROGRESS, Unit::Other),
    (V_CHARGE_LIMIT_RANGE, Unit::Kilometers),
    (V_CHARGE_LIMIT_SOC, Unit::Percentage),
    (V_CHARGE_DURATION_FULL, Unit::Minutes),
    (V_CHARGE_DURATION_RANGE, Unit::Minutes),
    (V_CHARGE_DURATION_SOC, Unit::Minutes),
    (V_CHARGE_TEMP, Unit::Celcius),
    (V_INV_TEMP, Unit::Celcius),
    (V_MOT_TEMP, Unit::Celcius),
    (V_DOOR_FL, Unit::Other),
    (V_DOOR_FR, Unit::Other),
    (V_DOOR_RL, Unit::Other),
    (V_DOOR_RR, Unit::Other),
    (V_DOOR_CHARGEPORT, Unit::Other),
    (V_DOOR_HOOD, Unit::Other),
    (V_DOOR_TRUNK, Unit::Other),
    (V_ENV_DRIVEMODE, Unit::Other),
    (V_ENV_HANDBRAKE, Unit::Other),
    (V_ENV_ON, Unit::Other),
    (V_ENV_AWAKE, Unit::Other),
    (V_ENV_COOLING, Unit::Other),
    (V_ENV_HEATING, Unit::Other),
    (V_ENV_HVAC, Unit::Other),
    (V_ENV_LOCKED, Unit::Other),
    (V_ENV_VALET, Unit::Other),
    (V_ENV_HEADLIGHTS, Unit::Other),
    (V_ENV_ALARM, Unit::Other),
    (V_ENV_CTRL_LOGIN, Unit::Other),
    (V_ENV_CTRL_CONFIG, Unit::Other),
    (V_ENV_CHARGING12V, Unit::Other),
    (V_ENV_TEMP, Unit::Celcius),
    (V_POS_GPSLOCK, Unit::Other),
    (V_POS_LATITUDE, Unit::Degrees),
    (V_POS_LONGITUDE, Unit::Degrees),
    (V_POS_DIRECTION, Unit::Degrees),
    (V_POS_ALTITUDE, Unit::Meters),
    (V_POS_SPEED, Unit::Kph),
    (V_POS_ODOMETER, Unit::Kilometers),
    (V_POS_TRIP, Unit::Kilometers),
    (V_TPMS_FL_T, Unit::Celcius),
    (V_TPMS_FR_T, Unit::Celcius),
    (V_TPMS_RL_T, Unit::Celcius),
    (V_TPMS_RR_T, Unit::Celcius),
    (V_TPMS_FL_P, Unit::Kpa),
    (V_TPMS_FR_P, Unit::Kpa),
    (V_TPMS_RL_P, Unit::Kpa),
    (V_TPMS_RR_P, Unit::Kpa),
];
