//! ovms-core - Shared stores and collaborator interfaces for OVMS server links
//!
//! This crate provides the pieces a server link talks to but does not own:
//! the metric store, the notification store, the configuration store, the
//! event bus, network connectivity, the active vehicle and a few platform
//! hooks (console shell, modem, restart).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Services                             │
//! │                                                               │
//! │  ┌──────────┐  ┌────────────┐  ┌─────────────┐  ┌──────────┐  │
//! │  │ Metrics  │  │NotifyStore │  │ ConfigStore │  │ EventBus │  │
//! │  │(values,  │  │(queues,    │  │(param/inst) │  │(signals) │  │
//! │  │ modified)│  │ cursors)   │  └─────────────┘  └──────────┘  │
//! │  └──────────┘  └────────────┘                                 │
//! │  ┌────────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │VehicleRegistry │  │NetworkMonitor │  │ Shell/Modem/Sys  │  │
//! │  └────────────────┘  └───────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod network;
pub mod notify;
pub mod platform;
pub mod vehicle;

pub use config::ConfigStore;
pub use error::{ConfigError, MetricError};
pub use events::{Event, EventBus};
pub use metrics::{MetricValue, Metrics, ModifierId, Unit};
pub use network::NetworkMonitor;
pub use notify::{NotifyCursor, NotifyEntry, NotifyStore, NotifyType, ReaderId};
pub use platform::{CommandShell, Modem, Services, SystemControl};
pub use vehicle::{ChargeMode, CommandStatus, MsgCommandResult, Vehicle, VehicleRegistry};
