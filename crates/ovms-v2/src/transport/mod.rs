//! Line transport
//!
//! A [`Connector`] opens byte streams to the server; a [`Connection`] wraps
//! one stream with line reassembly and read-with-timeout:
//! - `tcp`: plain TCP via tokio
//! - `mock`: in-memory duplex pipes for tests
//!
//! # Example
//!
//! ```ignore
//! use ovms_v2::transport::{Connection, Connector, TcpConnector};
//!
//! let connector = TcpConnector::default();
//! let stream = connector.connect("ovms.example.com", 6867).await?;
//! let mut conn = Connection::new(stream, "ovms.example.com:6867");
//! conn.write_all(b"hello\r\n").await?;
//! let reply = conn.read_line(Duration::from_secs(20)).await?;
//! ```

pub mod error;
pub mod mock;
mod tcp;

pub use error::TransportError;
pub use mock::MockConnector;
pub use tcp::TcpConnector;

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Largest line accepted from the server, excluding the terminator
pub const MAX_LINE: usize = 1024;

/// Bidirectional byte stream to the server
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

/// Opens connections to a server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn LinkStream>, TransportError>;
}

/// An open connection with line reassembly
pub struct Connection {
    stream: Box<dyn LinkStream>,
    buffer: BytesMut,
    peer: String,
}

impl Connection {
    pub fn new(stream: Box<dyn LinkStream>, peer: impl Into<String>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(MAX_LINE),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write the whole buffer in one go
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Next complete line, waiting at most `timeout` for more data
    ///
    /// Returns `Ok(None)` on timeout. Lines end at `\r` or `\n`; empty lines
    /// are skipped. A zero timeout only consumes data that is already readable.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line()? {
                trace!(peer = %self.peer, len = line.len(), "Line received");
                return Ok(Some(line));
            }

            let read = tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.buffer));
            match read.await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    debug!(peer = %self.peer, "Connection closed by server");
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn take_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                if self.buffer.len() > MAX_LINE {
                    return Err(TransportError::LineTooLong(MAX_LINE));
                }
                return Ok(None);
            };
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            // The second half of a CRLF
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_LINE {
                return Err(TransportError::LineTooLong(MAX_LINE));
            }
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
    }

    /// Close the write side; errors are irrelevant at this point
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn pair() -> (Connection, tokio::io::DuplexStream) {
        let (client, server) = duplex(4096);
        (Connection::new(Box::new(client), "test"), server)
    }

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let (mut conn, mut server) = pair();
        server.write_all(b"first\r\nsecond\n").await.unwrap();
        let timeout = Duration::from_millis(100);
        assert_eq!(conn.read_line(timeout).await.unwrap().as_deref(), Some("first"));
        assert_eq!(conn.read_line(timeout).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_bare_cr_ends_line() {
        let (mut conn, mut server) = pair();
        server.write_all(b"MP-S 0 tok dig\r").await.unwrap();
        let timeout = Duration::from_millis(100);
        assert_eq!(
            conn.read_line(timeout).await.unwrap().as_deref(),
            Some("MP-S 0 tok dig")
        );
        server.write_all(b"\r\n\nnext\r").await.unwrap();
        assert_eq!(conn.read_line(timeout).await.unwrap().as_deref(), Some("next"));
        assert_eq!(conn.buffered(), 0);
    }

    #[tokio::test]
    async fn test_partial_line_waits() {
        let (mut conn, mut server) = pair();
        server.write_all(b"MP-").await.unwrap();
        assert_eq!(conn.read_line(Duration::from_millis(20)).await.unwrap(), None);
        assert_eq!(conn.buffered(), 3);
        server.write_all(b"S 0 x y\r\n").await.unwrap();
        assert_eq!(
            conn.read_line(Duration::from_millis(100)).await.unwrap().as_deref(),
            Some("MP-S 0 x y")
        );
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (mut conn, server) = pair();
        drop(server);
        assert_eq!(
            conn.read_line(Duration::from_millis(100)).await,
            Err(TransportError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_overlong_line_rejected() {
        let (mut conn, mut server) = pair();
        server.write_all(&[b'A'; MAX_LINE + 1]).await.unwrap();
        assert_eq!(
            conn.read_line(Duration::from_millis(100)).await,
            Err(TransportError::LineTooLong(MAX_LINE))
        );
    }

    #[tokio::test]
    async fn test_read_error_after_line() {
        let stream = tokio_test::io::Builder::new()
            .read(b"MP-0 Z1\r\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut conn = Connection::new(Box::new(stream), "test");
        let timeout = Duration::from_millis(100);
        assert_eq!(conn.read_line(timeout).await.unwrap().as_deref(), Some("MP-0 Z1"));
        assert!(matches!(
            conn.read_line(timeout).await,
            Err(TransportError::ReceiveFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_write_all() {
        let (mut conn, mut server) = pair();
        conn.write_all(b"ping\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping\r\n");
    }
}
