//! Platform hooks and the shared service bundle

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::metrics::Metrics;
use crate::network::NetworkMonitor;
use crate::notify::NotifyStore;
use crate::vehicle::VehicleRegistry;

/// Console command interpreter
#[async_trait]
pub trait CommandShell: Send + Sync {
    /// Run one command line and return its captured output
    async fn execute(&self, line: &str) -> String;
}

/// Cellular modem
pub trait Modem: Send + Sync {
    /// Queue a raw AT command; returns whether it was accepted
    fn send_command(&self, command: &str) -> bool;
}

/// System-level control
pub trait SystemControl: Send + Sync {
    fn restart(&self);
}

/// Everything a server link needs from the rest of the system
#[derive(Clone)]
pub struct Services {
    pub metrics: Arc<Metrics>,
    pub notify: Arc<NotifyStore>,
    pub config: Arc<ConfigStore>,
    pub events: EventBus,
    pub network: NetworkMonitor,
    pub vehicles: Arc<VehicleRegistry>,
    pub shell: Option<Arc<dyn CommandShell>>,
    pub modem: Option<Arc<dyn Modem>>,
    pub system: Option<Arc<dyn SystemControl>>,
}

impl Services {
    /// Standard metrics, empty config wired to a fresh event bus, network down
    pub fn new() -> Self {
        let events = EventBus::new();
        Self::with_config(ConfigStore::with_events(events.clone()), events)
    }

    /// Use an already loaded config store; it should signal on `events`
    pub fn with_config(config: ConfigStore, events: EventBus) -> Self {
        Self {
            metrics: Arc::new(Metrics::with_standard()),
            notify: Arc::new(NotifyStore::new()),
            config: Arc::new(config),
            events,
            network: NetworkMonitor::default(),
            vehicles: Arc::new(VehicleRegistry::new()),
            shell: None,
            modem: None,
            system: None,
        }
    }

    pub fn with_shell(mut self, shell: Arc<dyn CommandShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_modem(mut self, modem: Arc<dyn Modem>) -> Self {
        self.modem = Some(modem);
        self
    }

    pub fn with_system(mut self, system: Arc<dyn SystemControl>) -> Self {
        self.system = Some(system);
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("metrics", &self.metrics)
            .field("vehicles", &self.vehicles)
            .field("network", &self.network.is_connected())
            .field("shell", &self.shell.is_some())
            .field("modem", &self.modem.is_some())
            .field("system", &self.system.is_some())
            .finish()
    }
}
