//! Process-wide server link
//!
//! At most one engine runs per process. The console and the daemon go
//! through these functions instead of holding the engine themselves.

use std::sync::OnceLock;

use ovms_core::Services;
use parking_lot::Mutex;
use tracing::info;

use crate::config::ServerOptions;
use crate::engine::ServerV2;
use crate::error::LinkError;

/// Status reported when no engine exists
pub const NOT_STARTED: &str = "OVMS v2 server has not been started";

static SERVER: OnceLock<Mutex<Option<ServerV2>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<ServerV2>> {
    SERVER.get_or_init(|| Mutex::new(None))
}

/// Start the engine unless one is already running
///
/// Returns `false` when an engine was already running.
pub fn start(services: Services, options: ServerOptions) -> Result<bool, LinkError> {
    let mut server = slot().lock();
    if server.is_some() {
        info!("OVMS v2 server is already running");
        return Ok(false);
    }
    *server = Some(ServerV2::start(services, options)?);
    Ok(true)
}

/// Stop and drop the engine; returns whether one was running
pub async fn stop() -> bool {
    let server = slot().lock().take();
    match server {
        Some(mut server) => {
            server.stop().await;
            true
        }
        None => false,
    }
}

pub fn status() -> String {
    slot()
        .lock()
        .as_ref()
        .map(ServerV2::status)
        .unwrap_or_else(|| NOT_STARTED.to_string())
}

pub fn is_running() -> bool {
    slot().lock().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkTiming;
    use crate::transport::MockConnector;
    use serial_test::serial;
    use std::sync::Arc;

    fn options() -> ServerOptions {
        let (connector, _server) = MockConnector::new();
        ServerOptions {
            timing: LinkTiming::default(),
            connector: Arc::new(connector),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_single_instance() {
        stop().await;
        assert_eq!(status(), NOT_STARTED);

        assert!(start(Services::new(), options()).unwrap());
        assert!(!start(Services::new(), options()).unwrap());
        assert!(is_running());
        assert_ne!(status(), NOT_STARTED);

        assert!(stop().await);
        assert!(!stop().await);
        assert_eq!(status(), NOT_STARTED);
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_unregisters_callbacks() {
        stop().await;
        let services = Services::new();
        start(services.clone(), options()).unwrap();
        stop().await;

        // With the reader gone nothing holds notifications back
        services
            .notify
            .raise(ovms_core::NotifyType::Info, "test", "after stop");
        assert!(services.notify.is_empty(ovms_core::NotifyType::Info));
    }
}
