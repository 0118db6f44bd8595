//! Session management for the server link
//!
//! This module owns the connection lifecycle: connect, the token/digest
//! login handshake, cipher derivation and encrypted framing.

mod manager;

pub use manager::{SessionManager, StatusCell};

use std::fmt;

use async_trait::async_trait;

use crate::error::LinkError;

/// Destination for outbound plaintext frames
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, message: &str) -> Result<(), LinkError>;
}

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    WaitingForNetwork,
    Connecting,
    /// TCP open, not authenticated
    Connected,
    /// Hello sent, waiting for the welcome line
    AwaitingChallenge,
    /// Keys derived, frames flow
    Authenticated,
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::WaitingForNetwork => "waiting for network",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::AwaitingChallenge => "awaiting challenge",
            LinkState::Authenticated => "authenticated",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
