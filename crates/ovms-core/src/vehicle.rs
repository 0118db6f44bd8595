//! Vehicle interface
//!
//! A vehicle implementation only overrides the commands it supports; every
//! default answers [`CommandStatus::NotImplemented`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

/// Result of a vehicle command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    NotImplemented,
    Success,
    Fail,
}

impl CommandStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Success)
    }
}

/// Outcome of offering a raw server command to the vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgCommandResult {
    /// Vehicle does not handle this code
    NotImplemented,
    Success(String),
    Failure(String),
}

/// Charge mode as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargeMode {
    Standard,
    Storage,
    Range,
    Performance,
}

impl ChargeMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ChargeMode::Standard),
            1 => Some(ChargeMode::Storage),
            3 => Some(ChargeMode::Range),
            4 => Some(ChargeMode::Performance),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ChargeMode::Standard => 0,
            ChargeMode::Storage => 1,
            ChargeMode::Range => 3,
            ChargeMode::Performance => 4,
        }
    }

    /// Metric text for `v.c.mode`
    pub fn name(&self) -> &'static str {
        match self {
            ChargeMode::Standard => "standard",
            ChargeMode::Storage => "storage",
            ChargeMode::Range => "range",
            ChargeMode::Performance => "performance",
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An active vehicle module
#[async_trait]
pub trait Vehicle: Send + Sync {
    /// Short vehicle type code (e.g. "DEMO")
    fn vehicle_type(&self) -> &str;

    /// Offered every server command before the generic handling
    async fn process_msg_command(&self, code: i32, args: Option<&str>) -> MsgCommandResult {
        let _ = (code, args);
        MsgCommandResult::NotImplemented
    }

    /// Feature value for slot `key`
    fn get_feature(&self, key: u32) -> Option<String> {
        let _ = key;
        None
    }

    /// Set feature slot `key`; returns whether the vehicle accepted it
    fn set_feature(&self, key: u32, value: &str) -> bool {
        let _ = (key, value);
        false
    }

    async fn set_charge_mode(&self, mode: ChargeMode) -> CommandStatus {
        let _ = mode;
        CommandStatus::NotImplemented
    }

    async fn start_charge(&self) -> CommandStatus {
        CommandStatus::NotImplemented
    }

    async fn stop_charge(&self) -> CommandStatus {
        CommandStatus::NotImplemented
    }

    async fn set_charge_current(&self, limit: i64) -> CommandStatus {
        let _ = limit;
        CommandStatus::NotImplemented
    }

    /// `start` is minutes past midnight
    async fn set_charge_timer(&self, enabled: bool, start: i64) -> CommandStatus {
        let _ = (enabled, start);
        CommandStatus::NotImplemented
    }

    async fn wakeup(&self) -> CommandStatus {
        CommandStatus::NotImplemented
    }

    async fn lock(&self, pin: &str) -> CommandStatus {
        let _ = pin;
        CommandStatus::NotImplemented
    }

    async fn unlock(&self, pin: &str) -> CommandStatus {
        let _ = pin;
        CommandStatus::NotImplemented
    }

    async fn activate_valet(&self, pin: &str) -> CommandStatus {
        let _ = pin;
        CommandStatus::NotImplemented
    }

    async fn deactivate_valet(&self, pin: &str) -> CommandStatus {
        let _ = pin;
        CommandStatus::NotImplemented
    }

    async fn homelink(&self, button: i64) -> CommandStatus {
        let _ = button;
        CommandStatus::NotImplemented
    }

    async fn cooldown(&self, enable: bool) -> CommandStatus {
        let _ = enable;
        CommandStatus::NotImplemented
    }
}

/// Holds the currently active vehicle, if any
#[derive(Default)]
pub struct VehicleRegistry {
    active: RwLock<Option<Arc<dyn Vehicle>>>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, vehicle: Arc<dyn Vehicle>) {
        info!(vehicle_type = vehicle.vehicle_type(), "Vehicle activated");
        *self.active.write() = Some(vehicle);
    }

    pub fn clear_active(&self) {
        if self.active.write().take().is_some() {
            info!("Vehicle deactivated");
        }
    }

    pub fn active(&self) -> Option<Arc<dyn Vehicle>> {
        self.active.read().clone()
    }
}

impl fmt::Debug for VehicleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.active.read();
        f.debug_struct("VehicleRegistry")
            .field("active", &active.as_ref().map(|v| v.vehicle_type().to_string()))
            .finish()
    }
}
