//! Metric units and conversions
//!
//! Values are stored in their native unit and converted at read time.

use std::fmt;

/// Unit a metric value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    /// Dimensionless or unit-less value
    #[default]
    Other,
    Kilometers,
    Miles,
    Meters,
    Kph,
    Mph,
    Celcius,
    Kpa,
    Psi,
    Volts,
    Amps,
    AmpHours,
    Kw,
    Kwh,
    Seconds,
    Minutes,
    Hours,
    Degrees,
    Percentage,
    /// Signal strength in dBm
    Dbm,
    /// Signal quality, the 0..31 scale modems report
    Sq,
}

const KM_PER_MILE: f64 = 1.609344;
const KPA_PER_PSI: f64 = 6.894757;

impl Unit {
    /// Short label used in listings
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Other => "",
            Unit::Kilometers => "km",
            Unit::Miles => "M",
            Unit::Meters => "m",
            Unit::Kph => "km/h",
            Unit::Mph => "mph",
            Unit::Celcius => "°C",
            Unit::Kpa => "kPa",
            Unit::Psi => "psi",
            Unit::Volts => "V",
            Unit::Amps => "A",
            Unit::AmpHours => "Ah",
            Unit::Kw => "kW",
            Unit::Kwh => "kWh",
            Unit::Seconds => "s",
            Unit::Minutes => "min",
            Unit::Hours => "h",
            Unit::Degrees => "°",
            Unit::Percentage => "%",
            Unit::Dbm => "dBm",
            Unit::Sq => "sq",
        }
    }

    /// Convert `value` from this unit into `to`
    ///
    /// Pairs without a defined conversion return the value unchanged.
    pub fn convert(self, value: f64, to: Unit) -> f64 {
        if self == to {
            return value;
        }
        match (self, to) {
            (Unit::Kilometers, Unit::Miles) | (Unit::Kph, Unit::Mph) => value / KM_PER_MILE,
            (Unit::Miles, Unit::Kilometers) | (Unit::Mph, Unit::Kph) => value * KM_PER_MILE,
            (Unit::Meters, Unit::Kilometers) => value / 1000.0,
            (Unit::Kilometers, Unit::Meters) => value * 1000.0,
            (Unit::Kpa, Unit::Psi) => value / KPA_PER_PSI,
            (Unit::Psi, Unit::Kpa) => value * KPA_PER_PSI,
            (Unit::Seconds, Unit::Minutes) => value / 60.0,
            (Unit::Seconds, Unit::Hours) => value / 3600.0,
            (Unit::Minutes, Unit::Seconds) => value * 60.0,
            (Unit::Minutes, Unit::Hours) => value / 60.0,
            (Unit::Hours, Unit::Minutes) => value * 60.0,
            (Unit::Hours, Unit::Seconds) => value * 3600.0,
            (Unit::Dbm, Unit::Sq) => {
                if value <= -51.0 {
                    ((value + 113.0) / 2.0).trunc()
                } else {
                    0.0
                }
            }
            (Unit::Sq, Unit::Dbm) => {
                if value > 0.0 {
                    value * 2.0 - 113.0
                } else {
                    0.0
                }
            }
            _ => value,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_conversion() {
        let miles = Unit::Kilometers.convert(160.9344, Unit::Miles);
        assert!((miles - 100.0).abs() < 1e-9);
        let km = Unit::Miles.convert(100.0, Unit::Kilometers);
        assert!((km - 160.9344).abs() < 1e-9);
    }

    #[test]
    fn test_pressure_conversion() {
        let psi = Unit::Kpa.convert(241.3165, Unit::Psi);
        assert!((psi - 35.0).abs() < 0.001);
    }

    #[test]
    fn test_signal_quality() {
        assert_eq!(Unit::Dbm.convert(-73.0, Unit::Sq), 20.0);
        assert_eq!(Unit::Dbm.convert(-40.0, Unit::Sq), 0.0);
    }

    #[test]
    fn test_unrelated_units_unchanged() {
        assert_eq!(Unit::Volts.convert(12.5, Unit::Psi), 12.5);
    }
}
