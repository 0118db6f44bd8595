//! Server link errors

use ovms_core::MetricError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors decoding an inbound frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Line is not valid base64
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decrypted frame lacks the `MP-0 ` prefix
    #[error("Invalid server message: {0:?}")]
    MissingPrefix(String),
}

/// Errors that end a connection attempt or an established session
///
/// Every variant maps to the status line shown by `server v2 status`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Required configuration value is empty
    #[error("Error: Parameter {0} must be defined")]
    MissingParameter(&'static str),

    #[error("Error: Cannot establish tcp/ip connection to server")]
    ConnectFailed(#[source] TransportError),

    #[error("Error: Server response is incomplete")]
    LoginTimeout,

    #[error("Error: Server response invalid (no token/digest separator)")]
    InvalidWelcome,

    #[error("Error: Detected token replay attack/collision")]
    TokenReplay,

    #[error("Error: Server digest does not authenticate")]
    DigestMismatch,

    #[error("Error: Server response was not a welcome MP-S")]
    NotWelcome,

    /// Operation needs an authenticated connection
    #[error("Error: Not logged in")]
    NotKeyed,

    #[error("Error: Network connectivity lost")]
    NetworkLost,

    #[error("Error: Disconnected from OVMS Server V2")]
    Transport(#[from] TransportError),

    #[error("Error: Disconnected from OVMS Server V2")]
    Codec(#[from] CodecError),

    /// Engine setup against the metric store failed
    #[error("Error: {0}")]
    Metric(#[from] MetricError),
}

impl LinkError {
    /// Status line for this error
    pub fn status(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines() {
        assert_eq!(
            LinkError::MissingParameter("vehicle/id").status(),
            "Error: Parameter vehicle/id must be defined"
        );
        assert_eq!(
            LinkError::ConnectFailed(TransportError::ConnectionClosed).status(),
            "Error: Cannot establish tcp/ip connection to server"
        );
        assert_eq!(
            LinkError::from(TransportError::ConnectionClosed).status(),
            "Error: Disconnected from OVMS Server V2"
        );
    }
}
