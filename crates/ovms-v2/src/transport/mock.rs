//! Mock connector for testing
//!
//! Every successful `connect` creates an in-memory duplex pipe and hands the
//! server half to the test through a channel, so a test can play the server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;

use super::{Connector, LinkStream, TransportError};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Server half of a mock connection
#[derive(Debug)]
pub struct MockServerConn {
    pub host: String,
    pub port: u16,
    pub stream: DuplexStream,
}

/// Mock connector for testing
pub struct MockConnector {
    accept_tx: mpsc::UnboundedSender<MockServerConn>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    last_target: RwLock<Option<(String, u16)>>,
}

impl MockConnector {
    /// Create a connector and the receiver the test accepts connections on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServerConn>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            accept_tx,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            last_target: RwLock::new(None),
        };
        (connector, accept_rx)
    }

    /// Refuse subsequent connection attempts
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_target(&self) -> Option<(String, u16)> {
        self.last_target.read().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn LinkStream>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_target.write() = Some((host.to_string(), port));

        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "Mock connection refused".to_string(),
            ));
        }

        let (client, server) = duplex(PIPE_CAPACITY);
        self.accept_tx
            .send(MockServerConn {
                host: host.to_string(),
                port,
                stream: server,
            })
            .map_err(|_| TransportError::ConnectionFailed("Mock server gone".to_string()))?;
        tracing::debug!(host, port, "Mock transport: connected");
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_hands_out_server_half() {
        let (connector, mut accept) = MockConnector::new();
        let mut client = connector.connect("example.org", 6867).await.unwrap();
        let mut server = accept.recv().await.unwrap();
        assert_eq!(server.host, "example.org");
        assert_eq!(server.port, 6867);

        client.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        server.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_refuse() {
        let (connector, _accept) = MockConnector::new();
        connector.set_refuse(true);
        assert!(connector.connect("example.org", 6867).await.is_err());
        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.last_target(), Some(("example.org".to_string(), 6867)));
    }
}
