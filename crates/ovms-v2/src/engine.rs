//! Server link engine
//!
//! One tokio task per engine runs the whole link: wait for the network,
//! connect, log in, then loop over inbound frames, periodic and out-of-cycle
//! metric groups and pending notifications until the connection drops.

use std::sync::{Arc, Weak};
use std::time::Duration;

use ovms_core::metrics::standard::{S_V2_CONNECTED, S_V2_PEERS, V_ENV_ON};
use ovms_core::metrics::MetricListener;
use ovms_core::{Event, MetricValue, Metrics, Services};
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::codec::{mp_encode, parse_frame, ServerMessage};
use crate::commands::CommandDispatcher;
use crate::config::{LinkSettings, LinkTiming, ServerOptions};
use crate::error::LinkError;
use crate::notifications::{NotificationDelivery, READER_NAME};
use crate::session::{FrameSink, LinkState, SessionManager, StatusCell};
use crate::transmitter::{triggered_groups, Group, GroupFlags, MetricTransmitter};

/// Metric listener name
pub const LISTENER_NAME: &str = "ovms-server-v2";

pub const EVENT_APP_CONNECTED: &str = "app.connected";
pub const EVENT_APP_DISCONNECTED: &str = "app.disconnected";
pub const EVENT_USSD_RECEIVED: &str = "system.modem.received.ussd";
pub const EVENT_CONFIG_CHANGED: &str = "config.changed";
pub const EVENT_CONFIG_MOUNTED: &str = "config.mounted";
pub const EVENT_SERVER_CONNECTED: &str = "server.v2.connected";
pub const EVENT_SERVER_DISCONNECTED: &str = "server.v2.disconnected";

/// A running server link
pub struct ServerV2 {
    status: StatusCell,
    shutdown: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
}

impl ServerV2 {
    /// Register callbacks and spawn the worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(services: Services, options: ServerOptions) -> Result<Self, LinkError> {
        let status: StatusCell = Arc::new(RwLock::new("Starting".to_string()));
        let flags = Arc::new(GroupFlags::new());
        let transmitter = MetricTransmitter::new(services.metrics.clone(), flags.clone())?;

        services.metrics.register_listener(
            LISTENER_NAME,
            metric_listener(Arc::downgrade(&services.metrics), Arc::downgrade(&flags)),
        );
        let delivery = NotificationDelivery::register(services.notify.clone());

        let worker = Worker {
            session: SessionManager::new(options.connector.clone(), options.timing, status.clone()),
            timing: options.timing,
            settings: LinkSettings::from_store(&services.config),
            events: services.events.subscribe(),
            dispatcher: CommandDispatcher::new(services.clone()),
            transmitter,
            delivery,
            services,
            lasttx: None,
            lasttx_stream: Instant::now(),
        };
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        info!("OVMS Server v2 started");

        Ok(Self {
            status,
            shutdown,
            worker: Some(handle),
        })
    }

    /// Current status line
    pub fn status(&self) -> String {
        self.status.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Close the connection, unregister callbacks and wait for the worker
    ///
    /// All teardown runs on the worker, so nothing it writes can land after
    /// this returns.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shutdown.notify_one();
        if let Err(e) = worker.await {
            warn!(error = %e, "Server link worker did not finish cleanly");
        }
        info!("OVMS Server v2 stopped");
    }
}

impl Drop for ServerV2 {
    // The worker tears down on its own; nothing here can wait for it
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            self.shutdown.notify_one();
        }
    }
}

impl std::fmt::Debug for ServerV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerV2")
            .field("status", &self.status())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Flags groups that apps should see right away
///
/// Runs on whatever task changed the metric, so it only touches atomics.
fn metric_listener(metrics: Weak<Metrics>, flags: Weak<GroupFlags>) -> MetricListener {
    Arc::new(move |name: &str| {
        let (Some(metrics), Some(flags)) = (metrics.upgrade(), flags.upgrade()) else {
            return;
        };
        if metrics.as_int(S_V2_PEERS, 0, None) == 0 {
            return;
        }
        for group in triggered_groups(name) {
            flags.set(group);
        }
    })
}

struct Worker {
    services: Services,
    timing: LinkTiming,
    session: SessionManager,
    transmitter: MetricTransmitter,
    delivery: NotificationDelivery,
    dispatcher: CommandDispatcher,
    events: broadcast::Receiver<Event>,
    settings: LinkSettings,
    /// Last periodic pass; `None` forces a full one
    lasttx: Option<Instant>,
    lasttx_stream: Instant,
}

impl Worker {
    async fn run(mut self, shutdown: Arc<Notify>) {
        info!("OVMS Server v2 task running");
        tokio::select! {
            _ = shutdown.notified() => {}
            _ = self.link() => {}
        }
        self.teardown().await;
    }

    /// Connect, log in and serve until the connection ends, forever
    async fn link(&mut self) {
        loop {
            self.drain_events().await;

            if !self.services.network.is_connected() {
                self.session.set_state(LinkState::WaitingForNetwork);
                self.session
                    .set_status("Waiting for network connectivity", false);
                while !self.services.network.is_connected() {
                    let _ = timeout(
                        self.timing.network_recheck,
                        self.services.network.wait_connected(),
                    )
                    .await;
                }
                self.session
                    .set_status("Network connectivity established", false);
            }

            if self.session.connect(&self.services.config).await.is_err() {
                sleep(self.timing.retry_delay).await;
                continue;
            }
            if self.session.login().await.is_err() {
                self.disconnect().await;
                sleep(self.timing.retry_delay).await;
                continue;
            }

            self.session.set_status("Connected and logged in", false);
            self.delivery.reset();
            self.set_metric(S_V2_CONNECTED, true);
            self.services.events.signal(EVENT_SERVER_CONNECTED, None);
            self.lasttx = None;

            let error = self.serve().await;
            warn!(error = %error, "Server link ended");
            self.disconnect().await;
            sleep(self.timing.retry_delay).await;
        }
    }

    async fn teardown(&mut self) {
        self.disconnect().await;
        self.services.metrics.deregister_listener(LISTENER_NAME);
        self.delivery.unregister();
        self.session.set_state(LinkState::Idle);
        self.session.set_status("Stopped", false);
    }

    async fn disconnect(&mut self) {
        self.session.disconnect().await;
        // Only a logged in link counts as connected; a failed login was never announced
        if self.services.metrics.as_bool(S_V2_CONNECTED, false) {
            self.set_metric(S_V2_CONNECTED, false);
            self.services.events.signal(EVENT_SERVER_DISCONNECTED, None);
        }
    }

    fn set_metric(&self, name: &str, value: impl Into<MetricValue>) {
        if let Err(e) = self.services.metrics.set(name, value) {
            warn!(metric = name, error = %e, "Cannot update metric");
        }
    }

    /// Run the connected loop until something breaks it
    async fn serve(&mut self) -> LinkError {
        loop {
            if let Err(e) = self.service_pass().await {
                return e;
            }
        }
    }

    async fn service_pass(&mut self) -> Result<(), LinkError> {
        self.drain_events().await;
        self.transmit_metrics().await?;

        let groups = self.transmitter.build_flagged(&self.settings);
        self.send_all(&groups).await?;

        self.delivery.flush(&mut self.session).await?;

        if let Some(frame) = self.session.receive(self.timing.poll_interval).await? {
            self.process_frame(&frame).await?;
            // Work through anything else already buffered
            while let Some(frame) = self.session.receive(Duration::ZERO).await? {
                self.process_frame(&frame).await?;
            }
        }

        if !self.services.network.is_connected() {
            return Err(LinkError::NetworkLost);
        }
        Ok(())
    }

    /// Periodic pass, or a GPS stream tick between passes
    async fn transmit_metrics(&mut self) -> Result<(), LinkError> {
        let metrics = &self.services.metrics;
        let peers = metrics.as_int(S_V2_PEERS, 0, None);
        let car_on = metrics.as_bool(V_ENV_ON, false);
        let now = Instant::now();
        let interval = if peers == 0 {
            self.timing.idle_interval
        } else {
            self.timing.peer_interval
        };

        let due = self.lasttx.map_or(true, |last| now >= last + interval);
        if due {
            let first = self.lasttx.is_none();
            let messages = self.transmitter.build_periodic(first, &self.settings);
            self.send_all(&messages).await?;
            self.lasttx = Some(now);
            self.lasttx_stream = now;
        } else if self.settings.streaming > 0
            && car_on
            && peers > 0
            && now >= self.lasttx_stream + Duration::from_secs(self.settings.streaming)
        {
            let messages = self.transmitter.build(Group::Gps, false, &self.settings);
            self.send_all(&messages).await?;
            self.lasttx_stream = now;
        }
        Ok(())
    }

    async fn send_all(&mut self, messages: &[String]) -> Result<(), LinkError> {
        for message in messages {
            self.session.send_frame(message).await?;
        }
        Ok(())
    }

    async fn process_frame(&mut self, frame: &str) -> Result<(), LinkError> {
        let message = match parse_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                info!(frame, "Invalid server message. Disconnecting.");
                return Err(e.into());
            }
        };
        match message {
            ServerMessage::Ping => self.session.send_frame("MP-0 a").await?,
            ServerMessage::Peers(peers) => self.update_peers(peers),
            ServerMessage::DataAck(id) => self.delivery.ack(id),
            ServerMessage::Command(payload) => {
                let reply = self.dispatcher.dispatch(payload).await;
                self.send_all(&reply.messages).await?;
                if reply.restart {
                    if let Some(system) = &self.services.system {
                        info!("Restart requested by server");
                        system.restart();
                    }
                }
            }
            ServerMessage::Unknown(body) => debug!(body, "Ignoring server message"),
        }
        Ok(())
    }

    fn update_peers(&mut self, peers: i64) {
        let old = self.services.metrics.as_int(S_V2_PEERS, 0, None);
        self.set_metric(S_V2_PEERS, peers);
        if peers > old {
            info!(peers, "One or more peers have connected");
            self.lasttx = None;
        }
        if old == 0 && peers > 0 {
            self.services.events.signal(EVENT_APP_CONNECTED, None);
        } else if old != 0 && peers == 0 {
            self.services.events.signal(EVENT_APP_DISCONNECTED, None);
        }
    }

    /// Handle events queued since the last pass
    async fn drain_events(&mut self) {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(missed)) => {
                    debug!(missed, "Event receiver lagged; rereading settings");
                    self.reload_settings();
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
            };
            match event.name.as_str() {
                EVENT_CONFIG_CHANGED | EVENT_CONFIG_MOUNTED => self.reload_settings(),
                EVENT_USSD_RECEIVED if self.session.is_keyed() => {
                    let text = event.data.as_deref().unwrap_or("");
                    let message = format!("MP-0 c41,0,{}", mp_encode(text));
                    if let Err(e) = self.session.send_frame(&message).await {
                        warn!(error = %e, "Cannot forward USSD response");
                    }
                }
                _ => {}
            }
        }
    }

    fn reload_settings(&mut self) {
        let settings = LinkSettings::from_store(&self.services.config);
        if settings != self.settings {
            debug!(?settings, "Link settings changed");
            self.settings = settings;
        }
    }
}
