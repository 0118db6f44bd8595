//! Demo vehicle
//!
//! Acts on commands by updating the standard metrics the way a real vehicle
//! module would once the car confirmed them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ovms_core::metrics::standard::*;
use ovms_core::{ChargeMode, CommandStatus, MetricValue, Metrics, Vehicle};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Feature slots the demo vehicle stores
const FEATURE_SLOTS: u32 = 16;

pub struct DemoVehicle {
    metrics: Arc<Metrics>,
    features: RwLock<BTreeMap<u32, String>>,
}

impl DemoVehicle {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            features: RwLock::new(BTreeMap::new()),
        }
    }

    fn update(&self, name: &str, value: impl Into<MetricValue>) -> CommandStatus {
        match self.metrics.set(name, value) {
            Ok(_) => CommandStatus::Success,
            Err(e) => {
                warn!(metric = name, error = %e, "Demo vehicle cannot update metric");
                CommandStatus::Fail
            }
        }
    }

    fn update_all(&self, values: &[(&str, MetricValue)]) -> CommandStatus {
        for (name, value) in values {
            if self.update(name, value.clone()) != CommandStatus::Success {
                return CommandStatus::Fail;
            }
        }
        CommandStatus::Success
    }

    fn check_pin(pin: &str) -> bool {
        !pin.is_empty() && pin.chars().all(|c| c.is_ascii_digit())
    }
}

#[async_trait]
impl Vehicle for DemoVehicle {
    fn vehicle_type(&self) -> &str {
        "DEMO"
    }

    fn get_feature(&self, key: u32) -> Option<String> {
        self.features.read().get(&key).cloned()
    }

    fn set_feature(&self, key: u32, value: &str) -> bool {
        if key >= FEATURE_SLOTS {
            return false;
        }
        debug!(key, value, "Feature set");
        self.features.write().insert(key, value.to_string());
        true
    }

    async fn set_charge_mode(&self, mode: ChargeMode) -> CommandStatus {
        info!(%mode, "Charge mode");
        self.update(V_CHARGE_MODE, mode.name())
    }

    async fn start_charge(&self) -> CommandStatus {
        if !self.metrics.as_bool(V_CHARGE_PILOT, false) {
            return CommandStatus::Fail;
        }
        self.update_all(&[
            (V_CHARGE_INPROGRESS, true.into()),
            (V_CHARGE_STATE, "charging".into()),
        ])
    }

    async fn stop_charge(&self) -> CommandStatus {
        self.update_all(&[
            (V_CHARGE_INPROGRESS, false.into()),
            (V_CHARGE_STATE, "stopped".into()),
            (V_CHARGE_SUBSTATE, "onrequest".into()),
        ])
    }

    async fn set_charge_current(&self, limit: i64) -> CommandStatus {
        if !(1..=80).contains(&limit) {
            return CommandStatus::Fail;
        }
        self.update(V_CHARGE_CLIMIT, limit)
    }

    async fn set_charge_timer(&self, enabled: bool, start: i64) -> CommandStatus {
        self.update_all(&[
            (V_CHARGE_TIMERMODE, enabled.into()),
            (V_CHARGE_TIMERSTART, start.into()),
        ])
    }

    async fn wakeup(&self) -> CommandStatus {
        self.update(V_ENV_AWAKE, true)
    }

    async fn lock(&self, pin: &str) -> CommandStatus {
        if !Self::check_pin(pin) {
            return CommandStatus::Fail;
        }
        self.update(V_ENV_LOCKED, true)
    }

    async fn unlock(&self, pin: &str) -> CommandStatus {
        if !Self::check_pin(pin) {
            return CommandStatus::Fail;
        }
        self.update(V_ENV_LOCKED, false)
    }

    async fn activate_valet(&self, pin: &str) -> CommandStatus {
        if !Self::check_pin(pin) {
            return CommandStatus::Fail;
        }
        self.update(V_ENV_VALET, true)
    }

    async fn deactivate_valet(&self, pin: &str) -> CommandStatus {
        if !Self::check_pin(pin) {
            return CommandStatus::Fail;
        }
        self.update(V_ENV_VALET, false)
    }

    async fn homelink(&self, button: i64) -> CommandStatus {
        if (0..=2).contains(&button) {
            info!(button, "Homelink");
            CommandStatus::Success
        } else {
            CommandStatus::Fail
        }
    }

    async fn cooldown(&self, enable: bool) -> CommandStatus {
        self.update(V_ENV_COOLING, enable)
    }
}
