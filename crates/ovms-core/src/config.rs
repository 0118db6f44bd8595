//! Configuration store
//!
//! Two-level `param/instance -> string` map. Files are TOML: every top-level
//! table is a param, every key below it an instance. Nested tables flatten
//! into dotted instance names, so `[vehicle] units.distance = "M"` is the
//! instance `units.distance` of param `vehicle`. Params containing a dot must
//! be quoted (`["server.v2"]`).

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::events::EventBus;

type ParamMap = BTreeMap<String, BTreeMap<String, String>>;

/// Thread-safe configuration store
#[derive(Debug, Default)]
pub struct ConfigStore {
    params: RwLock<ParamMap>,
    events: Option<EventBus>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that signals `config.changed`/`config.mounted` on `events`
    pub fn with_events(events: EventBus) -> Self {
        Self {
            params: RwLock::new(ParamMap::new()),
            events: Some(events),
        }
    }

    /// Value of `param/instance`, or `""` when unset
    pub fn get_param_value(&self, param: &str, instance: &str) -> String {
        self.get_param_value_or(param, instance, "")
    }

    pub fn get_param_value_or(&self, param: &str, instance: &str, default: &str) -> String {
        self.params
            .read()
            .get(param)
            .and_then(|p| p.get(instance))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, `default` when unset or not a number
    pub fn get_param_value_int(&self, param: &str, instance: &str, default: i64) -> i64 {
        self.get_param_value(param, instance)
            .trim()
            .parse()
            .unwrap_or(default)
    }

    pub fn get_param_value_bool(&self, param: &str, instance: &str, default: bool) -> bool {
        match self.get_param_value(param, instance).trim() {
            "yes" | "true" | "1" => true,
            "no" | "false" | "0" => false,
            _ => default,
        }
    }

    /// Set a value and signal `config.changed` with `"param/instance"`
    pub fn set_param_value(&self, param: &str, instance: &str, value: &str) {
        self.params
            .write()
            .entry(param.to_string())
            .or_default()
            .insert(instance.to_string(), value.to_string());
        debug!(param, instance, "Config value set");
        self.signal("config.changed", Some(format!("{}/{}", param, instance)));
    }

    /// Remove a value; returns whether it existed
    pub fn delete_instance(&self, param: &str, instance: &str) -> bool {
        let removed = self
            .params
            .write()
            .get_mut(param)
            .and_then(|p| p.remove(instance))
            .is_some();
        if removed {
            self.signal("config.changed", Some(format!("{}/{}", param, instance)));
        }
        removed
    }

    /// Instances of a param, sorted by name
    pub fn instances(&self, param: &str) -> Vec<(String, String)> {
        self.params
            .read()
            .get(param)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Merge TOML text into the store and signal `config.mounted`
    pub fn load_toml_str(&self, content: &str) -> Result<(), ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut parsed = ParamMap::new();
        for (param, value) in table {
            let toml::Value::Table(instances) = value else {
                return Err(ConfigError::Unsupported {
                    param: param.clone(),
                    instance: String::new(),
                    reason: "top-level values must be tables".to_string(),
                });
            };
            let entry = parsed.entry(param.clone()).or_default();
            flatten(&param, "", instances, entry)?;
        }

        let count: usize = parsed.values().map(BTreeMap::len).sum();
        {
            let mut params = self.params.write();
            for (param, instances) in parsed {
                params.entry(param).or_default().extend(instances);
            }
        }
        info!(count, "Configuration loaded");
        self.signal("config.mounted", None);
        Ok(())
    }

    /// Load a TOML file into a new store
    pub fn from_file(path: impl AsRef<Path>, events: Option<EventBus>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let store = Self {
            params: RwLock::new(ParamMap::new()),
            events,
        };
        store.load_toml_str(&content)?;
        Ok(store)
    }

    fn signal(&self, name: &str, data: Option<String>) {
        if let Some(events) = &self.events {
            events.signal(name, data);
        }
    }
}

fn flatten(
    param: &str,
    prefix: &str,
    table: toml::Table,
    out: &mut BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in table {
        let instance = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten(param, &instance, nested, out)?,
            other => {
                let text = scalar_text(&other).ok_or_else(|| ConfigError::Unsupported {
                    param: param.to_string(),
                    instance: instance.clone(),
                    reason: format!("cannot store {} values", other.type_str()),
                })?;
                out.insert(instance, text);
            }
        }
    }
    Ok(())
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Option<Vec<_>>>()
            .map(|v| v.join(",")),
        toml::Value::Table(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[vehicle]
id = "DEMO1"
units.distance = "M"
stream = 5

["server.v2"]
server = "ovms.example.com"
password = "secret"
port = 6870
groups = ["fleet", "club"]
"#;

    #[test]
    fn test_load_and_read() {
        let config = ConfigStore::new();
        config.load_toml_str(SAMPLE).unwrap();
        assert_eq!(config.get_param_value("vehicle", "id"), "DEMO1");
        assert_eq!(config.get_param_value("vehicle", "units.distance"), "M");
        assert_eq!(config.get_param_value_int("vehicle", "stream", 0), 5);
        assert_eq!(config.get_param_value_int("server.v2", "port", 6867), 6870);
        assert_eq!(config.get_param_value("server.v2", "groups"), "fleet,club");
        assert_eq!(config.get_param_value("server.v2", "missing"), "");
    }

    #[test]
    fn test_int_default_on_garbage() {
        let config = ConfigStore::new();
        config.set_param_value("vehicle", "stream", "often");
        assert_eq!(config.get_param_value_int("vehicle", "stream", 0), 0);
    }

    #[test]
    fn test_scalar_at_top_level_rejected() {
        let config = ConfigStore::new();
        let err = config.load_toml_str("id = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_set_signals_changed() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let config = ConfigStore::with_events(events);
        config.set_param_value("vehicle", "stream", "10");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "config.changed");
        assert_eq!(event.data.as_deref(), Some("vehicle/stream"));
    }

    #[tokio::test]
    async fn test_from_file_signals_mounted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let config = ConfigStore::from_file(file.path(), Some(events)).unwrap();
        assert_eq!(config.get_param_value("server.v2", "server"), "ovms.example.com");
        assert_eq!(rx.recv().await.unwrap().name, "config.mounted");
    }

    #[test]
    fn test_delete_instance() {
        let config = ConfigStore::new();
        config.set_param_value("modem", "apn", "internet");
        assert!(config.delete_instance("modem", "apn"));
        assert!(!config.delete_instance("modem", "apn"));
        assert!(config.instances("modem").is_empty());
    }
}
