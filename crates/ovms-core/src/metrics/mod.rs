//! Metric store
//!
//! Named, typed, unit-tagged values. Every metric carries one modification
//! bit per registered modifier so independent consumers can each ask "did
//! this change since I last looked?" without stepping on each other.

pub mod standard;
mod units;

pub use units::Unit;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetricError;

/// Identifies a consumer of modification flags (bit index)
pub type ModifierId = u32;

/// Callback invoked with the metric name after every value change
pub type MetricListener = Arc<dyn Fn(&str) + Send + Sync>;

const MAX_MODIFIERS: usize = 64;

/// A metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    fn to_f64(&self) -> f64 {
        match self {
            MetricValue::Bool(b) => f64::from(u8::from(*b)),
            MetricValue::Int(i) => *i as f64,
            MetricValue::Float(f) => *f,
            MetricValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            MetricValue::Bool(b) => *b,
            MetricValue::Int(i) => *i != 0,
            MetricValue::Float(f) => *f != 0.0,
            MetricValue::Text(s) => matches!(s.trim(), "yes" | "true" | "1"),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => f.write_str(if *b { "yes" } else { "no" }),
            MetricValue::Int(i) => write!(f, "{}", i),
            MetricValue::Float(v) => f.write_str(&format_float(*v)),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Int(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Float(f64::from(value))
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Six significant digits, trailing zeros dropped
fn format_float(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return if v.is_finite() { "0".to_string() } else { v.to_string() };
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).clamp(0, 15) as usize;
    let text = format!("{:.*}", decimals, v);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[derive(Debug)]
struct MetricSlot {
    unit: Unit,
    value: Option<MetricValue>,
    /// One bit per modifier; set on change, cleared by that modifier
    modified: u64,
    stale: bool,
    auto_stale: Option<Duration>,
    updated: Option<Instant>,
}

impl MetricSlot {
    fn new(unit: Unit) -> Self {
        Self {
            unit,
            value: None,
            modified: 0,
            stale: false,
            auto_stale: None,
            updated: None,
        }
    }

    fn is_stale(&self) -> bool {
        if self.stale {
            return true;
        }
        match (self.auto_stale, self.updated) {
            (Some(window), Some(updated)) => updated.elapsed() > window,
            _ => false,
        }
    }

    fn converted(&self, value: f64, to: Option<Unit>) -> f64 {
        match to {
            Some(unit) => self.unit.convert(value, unit),
            None => value,
        }
    }
}

/// Thread-safe metric store
#[derive(Default)]
pub struct Metrics {
    slots: RwLock<BTreeMap<String, MetricSlot>>,
    modifiers: Mutex<Vec<String>>,
    listeners: RwLock<Vec<(String, MetricListener)>>,
}

impl Metrics {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with all standard metrics registered
    pub fn with_standard() -> Self {
        let metrics = Self::new();
        for (name, unit) in standard::STANDARD_METRICS {
            metrics.register(name, *unit);
        }
        metrics
    }

    /// Register a metric; re-registering an existing name is a no-op
    pub fn register(&self, name: &str, unit: Unit) {
        self.slots
            .write()
            .entry(name.to_string())
            .or_insert_with(|| MetricSlot::new(unit));
    }

    /// Register a named modifier and return its id
    ///
    /// Registering the same name twice returns the id handed out first.
    pub fn register_modifier(&self, name: &str) -> Result<ModifierId, MetricError> {
        let mut modifiers = self.modifiers.lock();
        if let Some(pos) = modifiers.iter().position(|m| m == name) {
            return Ok(pos as ModifierId);
        }
        if modifiers.len() >= MAX_MODIFIERS {
            return Err(MetricError::ModifiersExhausted(name.to_string()));
        }
        modifiers.push(name.to_string());
        let id = (modifiers.len() - 1) as ModifierId;
        debug!(modifier = name, id, "Registered metric modifier");
        Ok(id)
    }

    /// Register a change listener under a caller name
    pub fn register_listener(&self, caller: &str, listener: MetricListener) {
        let mut listeners = self.listeners.write();
        listeners.retain(|(name, _)| name != caller);
        listeners.push((caller.to_string(), listener));
    }

    /// Remove every listener registered by `caller`
    pub fn deregister_listener(&self, caller: &str) {
        self.listeners.write().retain(|(name, _)| name != caller);
    }

    /// Set a metric value
    ///
    /// Returns `true` when the value changed. Listeners run after the store
    /// lock is released, so they may read metrics freely.
    pub fn set(&self, name: &str, value: impl Into<MetricValue>) -> Result<bool, MetricError> {
        let value = value.into();
        let changed = {
            let mut slots = self.slots.write();
            let slot = slots
                .get_mut(name)
                .ok_or_else(|| MetricError::UnknownMetric(name.to_string()))?;
            slot.updated = Some(Instant::now());
            slot.stale = false;
            if slot.value.as_ref() == Some(&value) {
                false
            } else {
                slot.value = Some(value);
                slot.modified = u64::MAX;
                true
            }
        };
        if changed {
            self.notify_listeners(name);
        }
        Ok(changed)
    }

    /// Forget a metric's value
    pub fn clear(&self, name: &str) -> Result<(), MetricError> {
        let mut slots = self.slots.write();
        let slot = slots
            .get_mut(name)
            .ok_or_else(|| MetricError::UnknownMetric(name.to_string()))?;
        slot.value = None;
        slot.updated = None;
        slot.modified = u64::MAX;
        Ok(())
    }

    fn notify_listeners(&self, name: &str) {
        let listeners: Vec<MetricListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(name);
        }
    }

    /// Current value, if defined
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.slots.read().get(name).and_then(|s| s.value.clone())
    }

    /// Native unit of a registered metric
    pub fn unit(&self, name: &str) -> Option<Unit> {
        self.slots.read().get(name).map(|s| s.unit)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.slots
            .read()
            .get(name)
            .is_some_and(|s| s.value.is_some())
    }

    /// Read and clear the modification bit of `modifier`
    pub fn is_modified_and_clear(&self, name: &str, modifier: ModifierId) -> bool {
        let bit = 1u64 << (modifier as usize % MAX_MODIFIERS);
        let mut slots = self.slots.write();
        match slots.get_mut(name) {
            Some(slot) => {
                let modified = slot.modified & bit != 0;
                slot.modified &= !bit;
                modified
            }
            None => false,
        }
    }

    pub fn is_stale(&self, name: &str) -> bool {
        self.slots.read().get(name).is_some_and(|s| s.is_stale())
    }

    pub fn set_stale(&self, name: &str, stale: bool) {
        if let Some(slot) = self.slots.write().get_mut(name) {
            slot.stale = stale;
        }
    }

    /// Treat the metric as stale once `window` passes without an update
    pub fn set_auto_stale(&self, name: &str, window: Duration) {
        if let Some(slot) = self.slots.write().get_mut(name) {
            slot.auto_stale = Some(window);
        }
    }

    pub fn as_bool(&self, name: &str, default: bool) -> bool {
        self.slots
            .read()
            .get(name)
            .and_then(|s| s.value.as_ref().map(MetricValue::to_bool))
            .unwrap_or(default)
    }

    /// Integer view, converted to `to` when given (truncating)
    pub fn as_int(&self, name: &str, default: i64, to: Option<Unit>) -> i64 {
        let slots = self.slots.read();
        let Some(slot) = slots.get(name) else {
            return default;
        };
        match &slot.value {
            None => default,
            Some(MetricValue::Int(i)) if to.is_none() => *i,
            Some(value) => slot.converted(value.to_f64(), to).trunc() as i64,
        }
    }

    /// Float view, converted to `to` when given
    pub fn as_float(&self, name: &str, default: f64, to: Option<Unit>) -> f64 {
        let slots = self.slots.read();
        let Some(slot) = slots.get(name) else {
            return default;
        };
        match &slot.value {
            None => default,
            Some(value) => slot.converted(value.to_f64(), to),
        }
    }

    /// String view
    ///
    /// Numeric values are converted to `to` when given; `precision` fixes the
    /// number of decimals for floats and is ignored for other types.
    pub fn as_string(
        &self,
        name: &str,
        default: &str,
        to: Option<Unit>,
        precision: Option<usize>,
    ) -> String {
        let slots = self.slots.read();
        let Some(slot) = slots.get(name) else {
            return default.to_string();
        };
        match &slot.value {
            None => default.to_string(),
            Some(MetricValue::Int(i)) => match to {
                Some(_) => (slot.converted(*i as f64, to).trunc() as i64).to_string(),
                None => i.to_string(),
            },
            Some(MetricValue::Float(f)) => {
                let v = slot.converted(*f, to);
                match precision {
                    Some(p) => format!("{:.*}", p, v),
                    None => format_float(v),
                }
            }
            Some(value) => value.to_string(),
        }
    }

    /// Snapshot of all defined metrics as `(name, value with unit)`
    pub fn list(&self, prefix: &str) -> Vec<(String, String)> {
        self.slots
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .filter_map(|(name, slot)| {
                slot.value.as_ref().map(|v| {
                    let unit = slot.unit.label();
                    let text = if unit.is_empty() {
                        v.to_string()
                    } else {
                        format!("{}{}", v, unit)
                    };
                    (name.clone(), text)
                })
            })
            .collect()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("count", &self.slots.read().len())
            .field("modifiers", &self.modifiers.lock().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_marks_modified_once_per_modifier() {
        let metrics = Metrics::with_standard();
        let a = metrics.register_modifier("a").unwrap();
        let b = metrics.register_modifier("b").unwrap();

        assert!(metrics.set(standard::V_BAT_SOC, 80).unwrap());
        assert!(metrics.is_modified_and_clear(standard::V_BAT_SOC, a));
        assert!(!metrics.is_modified_and_clear(standard::V_BAT_SOC, a));
        // b has its own bit
        assert!(metrics.is_modified_and_clear(standard::V_BAT_SOC, b));
    }

    #[test]
    fn test_unchanged_value_does_not_mark_modified() {
        let metrics = Metrics::with_standard();
        let id = metrics.register_modifier("x").unwrap();
        metrics.set(standard::V_BAT_SOC, 50).unwrap();
        metrics.is_modified_and_clear(standard::V_BAT_SOC, id);

        assert!(!metrics.set(standard::V_BAT_SOC, 50).unwrap());
        assert!(!metrics.is_modified_and_clear(standard::V_BAT_SOC, id));
    }

    #[test]
    fn test_register_modifier_is_idempotent() {
        let metrics = Metrics::new();
        let first = metrics.register_modifier("server").unwrap();
        let other = metrics.register_modifier("other").unwrap();
        assert_ne!(first, other);
        assert_eq!(metrics.register_modifier("server").unwrap(), first);
    }

    #[test]
    fn test_unknown_metric() {
        let metrics = Metrics::new();
        assert_eq!(
            metrics.set("x.y", 1),
            Err(MetricError::UnknownMetric("x.y".to_string()))
        );
    }

    #[test]
    fn test_listener_called_on_change_only() {
        let metrics = Metrics::with_standard();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        metrics.register_listener(
            "test",
            Arc::new(move |_name| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        metrics.set(standard::V_ENV_LOCKED, true).unwrap();
        metrics.set(standard::V_ENV_LOCKED, true).unwrap();
        metrics.set(standard::V_ENV_LOCKED, false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        metrics.deregister_listener("test");
        metrics.set(standard::V_ENV_LOCKED, true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_can_read_store() {
        let metrics = Arc::new(Metrics::with_standard());
        let seen = Arc::new(AtomicUsize::new(0));
        let store = Arc::downgrade(&metrics);
        let seen_clone = seen.clone();
        metrics.register_listener(
            "reader",
            Arc::new(move |name| {
                if let Some(m) = store.upgrade() {
                    seen_clone.store(m.as_int(name, 0, None) as usize, Ordering::SeqCst);
                }
            }),
        );
        metrics.set(standard::S_V2_PEERS, 3).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_defaults_for_undefined() {
        let metrics = Metrics::with_standard();
        assert_eq!(metrics.as_int(standard::V_BAT_SOC, 7, None), 7);
        assert_eq!(
            metrics.as_string(standard::V_CHARGE_STATE, "stopped", None, None),
            "stopped"
        );
        assert!(!metrics.as_bool(standard::V_ENV_ON, false));
        assert!(!metrics.is_defined(standard::V_ENV_ON));
    }

    #[test]
    fn test_conversions_on_read() {
        let metrics = Metrics::with_standard();
        metrics.set(standard::V_BAT_RANGE_IDEAL, 200).unwrap();
        assert_eq!(
            metrics.as_int(standard::V_BAT_RANGE_IDEAL, 0, Some(Unit::Miles)),
            124
        );
        metrics.set(standard::V_CHARGE_TIME, 3600).unwrap();
        assert_eq!(
            metrics.as_int(standard::V_CHARGE_TIME, 0, Some(Unit::Minutes)),
            60
        );
        metrics.set(standard::V_POS_LATITUDE, 51.5).unwrap();
        assert_eq!(
            metrics.as_string(standard::V_POS_LATITUDE, "0", None, Some(6)),
            "51.500000"
        );
        metrics.set(standard::V_BAT_POWER, -7.25).unwrap();
        assert_eq!(
            metrics.as_string(standard::V_BAT_POWER, "0", None, None),
            "-7.25"
        );
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(12.0), "12");
        assert_eq!(format_float(21.5), "21.5");
        assert_eq!(format_float(35.000012), "35");
        assert_eq!(format_float(0.123456789), "0.123457");
        assert_eq!(format_float(-0.0), "0");
        assert_eq!(format_float(123456.7), "123457");
    }

    #[test]
    fn test_stale() {
        let metrics = Metrics::with_standard();
        metrics.set(standard::V_ENV_TEMP, 21.0).unwrap();
        assert!(!metrics.is_stale(standard::V_ENV_TEMP));
        metrics.set_stale(standard::V_ENV_TEMP, true);
        assert!(metrics.is_stale(standard::V_ENV_TEMP));
        // A fresh value clears the stale flag
        metrics.set(standard::V_ENV_TEMP, 22.0).unwrap();
        assert!(!metrics.is_stale(standard::V_ENV_TEMP));

        metrics.set_auto_stale(standard::V_ENV_TEMP, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(metrics.is_stale(standard::V_ENV_TEMP));
    }

    #[test]
    fn test_list_with_prefix() {
        let metrics = Metrics::with_standard();
        metrics.set(standard::V_BAT_SOC, 80).unwrap();
        metrics.set(standard::V_POS_SPEED, 50).unwrap();
        let listed = metrics.list("v.b.");
        assert_eq!(listed, vec![("v.b.soc".to_string(), "80%".to_string())]);
    }
}
