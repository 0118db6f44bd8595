//! Network connectivity flag

use tokio::sync::watch;
use tracing::info;

/// Tracks whether the module has an IP route to the outside world
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        Self { tx }
    }

    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_replace(connected) != connected;
        if changed {
            info!(connected, "Network connectivity changed");
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the network is up
    pub async fn wait_connected(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|up| *up).await;
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
