//! ovms-v2 - OVMS protocol v2 server link
//!
//! Keeps an authenticated, RC4 encrypted line protocol session to an OVMS v2
//! server: pushes metric groups when they change or on a timer, answers
//! remote commands and delivers notifications with acknowledgement.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ServerV2 (engine)                      │
//! │  one worker task per link                                     │
//! │                                                               │
//! │  ┌──────────────────┐  ┌─────────────────┐  ┌──────────────┐  │
//! │  │MetricTransmitter │  │CommandDispatcher│  │Notification  │  │
//! │  │(groups, flags)   │  │(C frames)       │  │Delivery      │  │
//! │  └────────┬─────────┘  └────────┬────────┘  └──────┬───────┘  │
//! │           └─────────────┬───────┴──────────────────┘          │
//! │                  ┌──────┴───────┐                              │
//! │                  │SessionManager│ login, RC4 ciphers, codec    │
//! │                  └──────┬───────┘                              │
//! │                  ┌──────┴───────┐                              │
//! │                  │  Connector   │ TCP / in-memory mock         │
//! │                  └──────────────┘                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod registry;
pub mod session;
pub mod transmitter;
pub mod transport;

pub use commands::{CommandDispatcher, CommandReply};
pub use config::{DistanceUnits, LinkSettings, LinkTiming, ServerConfig, ServerOptions};
pub use engine::ServerV2;
pub use error::{CodecError, LinkError};
pub use session::{FrameSink, LinkState, SessionManager};
pub use transmitter::{Group, GroupFlags, MetricTransmitter};
pub use transport::{Connector, MockConnector, TcpConnector, TransportError};
