//! Session manager for the server link

use std::sync::Arc;

use async_trait::async_trait;
use ovms_core::ConfigStore;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{FrameSink, LinkState};
use crate::codec::{decode_line, encode_line};
use crate::config::{LinkTiming, ServerConfig};
use crate::crypto::{generate_token, token_digest, verify_token_digest, SessionCiphers};
use crate::error::LinkError;
use crate::transport::{Connection, Connector, TransportError};

const HELLO_PREFIX: &str = "MP-C 0 ";
const WELCOME_PREFIX: &str = "MP-S 0 ";

/// Shared, human readable connection status
pub type StatusCell = Arc<RwLock<String>>;

/// Owns one server connection at a time and its cipher state
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    timing: LinkTiming,
    status: StatusCell,
    state: LinkState,
    server: Option<ServerConfig>,
    connection: Option<Connection>,
    ciphers: Option<SessionCiphers>,
    token: String,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, timing: LinkTiming, status: StatusCell) -> Self {
        Self {
            connector,
            timing,
            status,
            state: LinkState::Idle,
            server: None,
            connection: None,
            ciphers: None,
            token: String::new(),
        }
    }

    /// Record a status line; faults log at error level
    pub fn set_status(&self, status: &str, fault: bool) {
        if fault {
            error!(status, "Status");
        } else {
            info!(status, "Status");
        }
        *self.status.write() = status.to_string();
    }

    pub fn status(&self) -> String {
        self.status.read().clone()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Link state");
            self.state = state;
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether cipher state for the current connection exists
    pub fn is_keyed(&self) -> bool {
        self.ciphers.is_some()
    }

    /// Token sent with the most recent hello
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Open a connection using the current configuration
    ///
    /// Any previous connection and its keys are dropped first.
    pub async fn connect(&mut self, config: &ConfigStore) -> Result<(), LinkError> {
        self.close().await;
        self.set_state(LinkState::Connecting);

        let result = self.open(config).await;
        match &result {
            Ok(()) => {
                self.set_state(LinkState::Connected);
                self.set_status("Connected to server", false);
            }
            Err(e) => {
                self.set_state(LinkState::Disconnected);
                self.set_status(&e.status(), true);
            }
        }
        result
    }

    async fn open(&mut self, config: &ConfigStore) -> Result<(), LinkError> {
        let server = ServerConfig::from_store(config)?;
        info!(
            host = %server.host,
            port = server.port,
            vehicle = %server.vehicle_id,
            "Connecting to OVMS Server V2"
        );
        let stream = self
            .connector
            .connect(&server.host, server.port)
            .await
            .map_err(LinkError::ConnectFailed)?;
        let peer = format!("{}:{}", server.host, server.port);
        self.connection = Some(Connection::new(stream, peer));
        self.server = Some(server);
        Ok(())
    }

    /// Run the login handshake on the open connection
    pub async fn login(&mut self) -> Result<(), LinkError> {
        self.set_status("Logging in...", false);
        let result = self.handshake().await;
        match &result {
            Ok(()) => {
                self.set_state(LinkState::Authenticated);
                self.set_status(
                    "OVMS V2 login successful, and crypto channel established",
                    false,
                );
            }
            Err(e) => self.set_status(&e.status(), true),
        }
        result
    }

    async fn handshake(&mut self) -> Result<(), LinkError> {
        let server = self
            .server
            .clone()
            .ok_or(LinkError::Transport(TransportError::ConnectionClosed))?;
        let connection = self
            .connection
            .as_mut()
            .ok_or(LinkError::Transport(TransportError::ConnectionClosed))?;

        let token = generate_token();
        let hello = format!(
            "{}{} {} {}",
            HELLO_PREFIX,
            token,
            token_digest(&token, &server.password),
            server.vehicle_id
        );
        debug!(vehicle = %server.vehicle_id, "Sending server login");
        connection.write_all(format!("{}\r\n", hello).as_bytes()).await?;
        self.token = token;
        self.state = LinkState::AwaitingChallenge;

        let line = match connection.read_line(self.timing.login_timeout).await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                info!(buffered = connection.buffered(), "Server response is incomplete");
                return Err(LinkError::LoginTimeout);
            }
        };
        debug!(response = %line, "Received welcome response");

        let welcome = line
            .strip_prefix(WELCOME_PREFIX)
            .ok_or(LinkError::NotWelcome)?;
        let (server_token, server_digest) =
            welcome.split_once(' ').ok_or(LinkError::InvalidWelcome)?;

        if server_token == self.token {
            return Err(LinkError::TokenReplay);
        }
        if !verify_token_digest(server_token, &server.password, server_digest) {
            return Err(LinkError::DigestMismatch);
        }

        self.set_status("Server auth ok. Now priming crypto.", false);
        self.ciphers = Some(SessionCiphers::derive(
            server_token,
            &self.token,
            &server.password,
        ));
        Ok(())
    }

    /// Encrypt and send one message; empty messages are skipped
    pub async fn transmit(&mut self, message: &str) -> Result<(), LinkError> {
        let (Some(ciphers), Some(connection)) = (self.ciphers.as_mut(), self.connection.as_mut())
        else {
            return Err(LinkError::NotKeyed);
        };
        let Some(line) = encode_line(&mut ciphers.tx, message) else {
            return Ok(());
        };
        debug!(message, "Send");
        connection.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Next decrypted frame, waiting at most `timeout`
    ///
    /// Blank lines are skipped.
    pub async fn receive(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        let (Some(ciphers), Some(connection)) = (self.ciphers.as_mut(), self.connection.as_mut())
        else {
            return Err(LinkError::NotKeyed);
        };
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(line) = connection.read_line(remaining).await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            let frame = decode_line(&mut ciphers.rx, &line)?;
            debug!(frame = %frame, "Incoming message");
            return Ok(Some(frame));
        }
    }

    /// Close the connection and forget its keys
    ///
    /// Returns whether a connection was open.
    pub async fn disconnect(&mut self) -> bool {
        let was_open = self.close().await;
        if was_open {
            self.set_status("Error: Disconnected from OVMS Server V2", true);
        }
        self.set_state(LinkState::Disconnected);
        was_open
    }

    async fn close(&mut self) -> bool {
        self.ciphers = None;
        match self.connection.take() {
            Some(mut connection) => {
                debug!(peer = connection.peer(), "Closing connection");
                connection.shutdown().await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl FrameSink for SessionManager {
    async fn send_frame(&mut self, message: &str) -> Result<(), LinkError> {
        self.transmit(message).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state)
            .field("connection", &self.connection)
            .field("keyed", &self.ciphers.is_some())
            .finish()
    }
}
