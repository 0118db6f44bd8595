//! Server link configuration
//!
//! Connection parameters come from the shared config store on every connect,
//! so changes take effect on the next reconnect. Timings are fixed per engine.

use std::sync::Arc;
use std::time::Duration;

use ovms_core::{ConfigStore, Unit};

use crate::error::LinkError;
use crate::transport::{Connector, TcpConnector};

/// Default server port
pub const DEFAULT_PORT: u16 = 6867;

pub const PARAM_VEHICLE: &str = "vehicle";
pub const PARAM_SERVER: &str = "server.v2";

/// Connection parameters for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub vehicle_id: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ServerConfig {
    /// Read and validate the connection parameters
    pub fn from_store(config: &ConfigStore) -> Result<Self, LinkError> {
        let vehicle_id = config.get_param_value(PARAM_VEHICLE, "id");
        let host = config.get_param_value(PARAM_SERVER, "server");
        let password = config.get_param_value(PARAM_SERVER, "password");
        let port = config
            .get_param_value(PARAM_SERVER, "port")
            .trim()
            .parse()
            .unwrap_or(DEFAULT_PORT);

        if vehicle_id.is_empty() {
            return Err(LinkError::MissingParameter("vehicle/id"));
        }
        if host.is_empty() {
            return Err(LinkError::MissingParameter("server.v2/server"));
        }
        if password.is_empty() {
            return Err(LinkError::MissingParameter("server.v2/password"));
        }
        Ok(Self {
            vehicle_id,
            host,
            port,
            password,
        })
    }
}

/// Distance unit preference for outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnits {
    #[default]
    Kilometers,
    Miles,
}

impl DistanceUnits {
    pub fn from_store(config: &ConfigStore) -> Self {
        if config.get_param_value(PARAM_VEHICLE, "units.distance") == "M" {
            DistanceUnits::Miles
        } else {
            DistanceUnits::Kilometers
        }
    }

    /// Wire tag in the stat message
    pub fn tag(&self) -> &'static str {
        match self {
            DistanceUnits::Kilometers => "K",
            DistanceUnits::Miles => "M",
        }
    }

    pub fn distance(&self) -> Unit {
        match self {
            DistanceUnits::Kilometers => Unit::Kilometers,
            DistanceUnits::Miles => Unit::Miles,
        }
    }

    pub fn speed(&self) -> Unit {
        match self {
            DistanceUnits::Kilometers => Unit::Kph,
            DistanceUnits::Miles => Unit::Mph,
        }
    }
}

/// Settings that may change while connected
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkSettings {
    pub units: DistanceUnits,
    /// GPS streaming interval in seconds, 0 = off
    pub streaming: u64,
    /// Group names for the `g` message
    pub groups: Vec<String>,
}

impl LinkSettings {
    pub fn from_store(config: &ConfigStore) -> Self {
        let streaming = config.get_param_value_int(PARAM_VEHICLE, "stream", 0).max(0) as u64;
        let groups = config
            .get_param_value(PARAM_SERVER, "groups")
            .split([',', ' '])
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            units: DistanceUnits::from_store(config),
            streaming,
            groups,
        }
    }
}

/// Protocol timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Wait for the welcome line
    pub login_timeout: Duration,
    /// Pause after a failed connect or login
    pub retry_delay: Duration,
    /// Read-or-timeout granularity of the service loop
    pub poll_interval: Duration,
    /// Recheck interval while waiting for the network
    pub network_recheck: Duration,
    /// Full transmission interval with no peers attached
    pub idle_interval: Duration,
    /// Full transmission interval with peers attached
    pub peer_interval: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            network_recheck: Duration::from_secs(5),
            idle_interval: Duration::from_secs(600),
            peer_interval: Duration::from_secs(60),
        }
    }
}

/// Engine construction options
#[derive(Clone)]
pub struct ServerOptions {
    pub timing: LinkTiming,
    pub connector: Arc<dyn Connector>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            timing: LinkTiming::default(),
            connector: Arc::new(TcpConnector::default()),
        }
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
