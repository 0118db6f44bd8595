//! End-to-end tests: the engine against a scripted server over the
//! in-memory connector.

use std::sync::Arc;
use std::time::Duration;

use ovms_core::metrics::standard::*;
use ovms_core::{NotifyType, Services};
use ovms_v2::codec::{decode_line, encode_line};
use ovms_v2::crypto::{token_digest, SessionCiphers};
use ovms_v2::transport::mock::MockServerConn;
use ovms_v2::{LinkTiming, MockConnector, ServerOptions, ServerV2};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{error::Elapsed, timeout, Instant};

const PASSWORD: &str = "secret";
const SERVER_TOKEN: &str = "ServerToken0123456789+/";
const WAIT: Duration = Duration::from_secs(5);

fn timing() -> LinkTiming {
    LinkTiming {
        poll_interval: Duration::from_millis(20),
        retry_delay: Duration::from_millis(100),
        ..LinkTiming::default()
    }
}

fn services() -> Services {
    let services = Services::new();
    services.config.set_param_value("vehicle", "id", "DEMO1");
    services.config.set_param_value("server.v2", "server", "ovms.test");
    services.config.set_param_value("server.v2", "password", PASSWORD);
    services.network.set_connected(true);
    services
}

fn start(services: &Services) -> (ServerV2, Arc<MockConnector>, UnboundedReceiver<MockServerConn>) {
    start_with(services, timing())
}

fn start_with(
    services: &Services,
    timing: LinkTiming,
) -> (ServerV2, Arc<MockConnector>, UnboundedReceiver<MockServerConn>) {
    let (connector, accepted) = MockConnector::new();
    let connector = Arc::new(connector);
    let options = ServerOptions {
        timing,
        connector: connector.clone(),
    };
    let server = ServerV2::start(services.clone(), options).unwrap();
    (server, connector, accepted)
}

/// Server side of one connection
struct FakeServer {
    stream: BufReader<DuplexStream>,
    ciphers: SessionCiphers,
}

impl FakeServer {
    async fn accept(accepted: &mut UnboundedReceiver<MockServerConn>) -> Self {
        let conn = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
        let mut stream = BufReader::new(conn.stream);

        let mut hello = String::new();
        timeout(WAIT, stream.read_line(&mut hello)).await.unwrap().unwrap();
        let fields: Vec<&str> = hello.trim_end().split(' ').collect();
        assert_eq!(fields[0], "MP-C");
        assert_eq!(fields[3], token_digest(fields[2], PASSWORD));
        assert_eq!(fields[4], "DEMO1");
        let token = fields[2].to_string();

        let welcome = format!(
            "MP-S 0 {} {}\r\n",
            SERVER_TOKEN,
            token_digest(SERVER_TOKEN, PASSWORD)
        );
        stream.get_mut().write_all(welcome.as_bytes()).await.unwrap();

        Self {
            stream,
            ciphers: SessionCiphers::derive(SERVER_TOKEN, &token, PASSWORD),
        }
    }

    /// Next frame from the client, `None` at end of stream
    async fn recv(&mut self) -> Option<String> {
        self.recv_for(WAIT).await.expect("client went quiet")
    }

    /// Like `recv`, but waits at most `limit`
    async fn recv_for(&mut self, limit: Duration) -> Result<Option<String>, Elapsed> {
        let mut line = String::new();
        let n = timeout(limit, self.stream.read_line(&mut line)).await?.unwrap();
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&mut self.ciphers.rx, line.trim_end()).unwrap()))
    }

    /// Frames with their arrival offset from `since` in whole seconds, until
    /// `count` frames carrying `tag` have arrived
    async fn collect_until(&mut self, since: Instant, tag: &str, count: usize) -> Vec<(u64, String)> {
        let mut seen = Vec::new();
        while seen.iter().filter(|(_, t)| t == tag).count() < count {
            let frame = self
                .recv_for(Duration::from_secs(3600))
                .await
                .expect("client went quiet")
                .expect("connection closed");
            seen.push((since.elapsed().as_secs(), frame[..6].to_string()));
        }
        seen
    }

    /// Read frames until one starts with `prefix`; returns everything read
    async fn recv_until(&mut self, prefix: &str) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let frame = self.recv().await.expect("connection closed");
            let done = frame.starts_with(prefix);
            seen.push(frame);
            if done {
                return seen;
            }
        }
    }

    async fn send(&mut self, frame: &str) {
        let line = encode_line(&mut self.ciphers.tx, frame).unwrap();
        self.stream.get_mut().write_all(line.as_bytes()).await.unwrap();
    }

    /// Frames of the first full dump after login
    async fn initial_dump(&mut self) -> Vec<String> {
        self.recv_until("MP-0 V").await
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn tags(frames: &[String]) -> Vec<String> {
    frames.iter().map(|f| f[..6].to_string()).collect()
}

#[tokio::test]
async fn test_login_dump_and_ping() {
    let services = services();
    let (server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;

    let dump = fake.initial_dump().await;
    assert_eq!(
        tags(&dump),
        vec!["MP-0 S", "MP-0 D", "MP-0 L", "MP-0 W", "MP-0 F", "MP-0 V"]
    );
    assert_eq!(dump[5], "MP-0 VC1-7,C10-12,C15-25,C41");
    eventually(|| services.metrics.as_bool(S_V2_CONNECTED, false)).await;
    assert_eq!(server.status(), "Connected and logged in");

    fake.send("MP-0 A").await;
    assert_eq!(fake.recv().await.as_deref(), Some("MP-0 a"));
}

#[tokio::test]
async fn test_peers_trigger_events_and_full_dump() {
    let services = services();
    let mut events = services.events.subscribe();
    let (_server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;

    fake.send("MP-0 Z1").await;
    let dump = fake.initial_dump().await;
    assert_eq!(dump.first().map(|f| &f[..6]), Some("MP-0 S"));
    assert_eq!(services.metrics.as_int(S_V2_PEERS, 0, None), 1);

    // Apps are watching: a door change goes out right away
    services.metrics.set(V_ENV_LOCKED, true).unwrap();
    let frames = fake.recv_until("MP-0 D").await;
    let env = frames.last().unwrap();
    assert_eq!(env[6..].split(',').nth(2), Some("4"));

    fake.send("MP-0 Z0").await;
    eventually(|| services.metrics.as_int(S_V2_PEERS, 1, None) == 0).await;

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    let app_events: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| n.starts_with("app."))
        .collect();
    assert_eq!(app_events, vec!["app.connected", "app.disconnected"]);
}

#[tokio::test]
async fn test_notifications_and_data_ack() {
    let services = services();
    let (_server, _connector, mut accepted) = start(&services);
    // Raised after start so the link's reader sees them
    services.notify.raise(NotifyType::Alert, "alarm", "Alarm, sounding");
    let data_id = services
        .notify
        .raise(NotifyType::Data, "log", "*-Log-Test,1,86400\nsecond line");

    let mut fake = FakeServer::accept(&mut accepted).await;
    let frames = fake.recv_until("MP-0 h").await;
    assert!(frames.contains(&"MP-0 PAAlarm; sounding".to_string()));
    assert_eq!(
        frames.last().unwrap(),
        &format!("MP-0 h{},0,*-Log-Test,1,86400", data_id)
    );
    assert!(!services.notify.is_empty(NotifyType::Data));

    fake.send(&format!("MP-0 h{}", data_id)).await;
    eventually(|| services.notify.is_empty(NotifyType::Data)).await;
}

#[tokio::test]
async fn test_unacknowledged_data_is_resent_after_reconnect() {
    let services = services();
    let mut events = services.events.subscribe();
    let (_server, connector, mut accepted) = start(&services);
    let data_id = services.notify.raise(NotifyType::Data, "log", "row");

    let fake = {
        let mut fake = FakeServer::accept(&mut accepted).await;
        fake.recv_until("MP-0 h").await;
        fake
    };
    drop(fake);

    let mut fake = FakeServer::accept(&mut accepted).await;
    let frames = fake.recv_until("MP-0 h").await;
    assert_eq!(frames.last().unwrap(), &format!("MP-0 h{},0,row", data_id));
    assert_eq!(connector.attempts(), 2);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    assert_eq!(
        names,
        vec!["server.v2.connected", "server.v2.disconnected", "server.v2.connected"]
    );
}

#[tokio::test]
async fn test_commands_and_ussd_forwarding() {
    let services = services();
    let (_server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;

    fake.send("MP-0 C2,3,1").await;
    let frames = fake.recv_until("MP-0 c2").await;
    assert_eq!(frames.last().unwrap(), "MP-0 c2,1,No active vehicle");

    fake.send("MP-0 C40,123,hello").await;
    let frames = fake.recv_until("MP-0 c40").await;
    assert_eq!(frames.last().unwrap(), "MP-0 c40,2");

    services
        .events
        .signal("system.modem.received.ussd", Some("Balance, 5 EUR".to_string()));
    let frames = fake.recv_until("MP-0 c41").await;
    assert_eq!(frames.last().unwrap(), "MP-0 c41,0,Balance; 5 EUR");
}

#[tokio::test]
async fn test_group_messages_follow_config() {
    let services = services();
    services.config.set_param_value("server.v2", "groups", "fleet");
    services.metrics.set(V_BAT_SOC, 64).unwrap();
    let (_server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;

    let dump = fake.initial_dump().await;
    assert!(dump.contains(&"MP-0 gfleet,64,0,0,0,0,1,0,0".to_string()));
}

#[tokio::test]
async fn test_invalid_frame_disconnects() {
    let services = services();
    let (server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;

    fake.send("XX-0 junk").await;
    // Drain until the client closes its side
    while fake.recv().await.is_some() {}
    eventually(|| !services.metrics.as_bool(S_V2_CONNECTED, true)).await;
    assert!(server.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_retries() {
    let services = services();
    let (_server, connector, mut accepted) = start(&services);

    let conn = accepted.recv().await.unwrap();
    let mut stream = BufReader::new(conn.stream);
    let mut hello = String::new();
    stream.read_line(&mut hello).await.unwrap();
    assert!(hello.starts_with("MP-C 0 "));

    // No welcome: the client gives up after the login timeout and closes
    let mut rest = String::new();
    assert_eq!(stream.read_line(&mut rest).await.unwrap(), 0);

    let _second = accepted.recv().await.unwrap();
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn test_missing_config_reports_status() {
    let services = Services::new();
    services.network.set_connected(true);
    let (server, connector, _accepted) = start(&services);

    eventually(|| server.status() == "Error: Parameter vehicle/id must be defined").await;
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_waits_for_network() {
    let services = services();
    services.network.set_connected(false);
    let (server, _connector, mut accepted) = start(&services);

    eventually(|| server.status() == "Waiting for network connectivity").await;
    services.network.set_connected(true);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;
}

fn at(secs: u64, tag: &str) -> (u64, String) {
    (secs, tag.to_string())
}

#[tokio::test(start_paused = true)]
async fn test_idle_cadence_sends_stat_and_environment() {
    let services = services();
    let (_server, _connector, mut accepted) = start_with(&services, LinkTiming::default());
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;
    let since = Instant::now();

    let frames = fake.collect_until(since, "MP-0 D", 2).await;
    assert_eq!(
        frames,
        vec![
            at(600, "MP-0 S"),
            at(600, "MP-0 D"),
            at(1200, "MP-0 S"),
            at(1200, "MP-0 D"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_peer_cadence() {
    let services = services();
    let (_server, _connector, mut accepted) = start_with(&services, LinkTiming::default());
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;

    fake.send("MP-0 Z1").await;
    let since = Instant::now();
    let stats: Vec<u64> = fake
        .collect_until(since, "MP-0 S", 3)
        .await
        .into_iter()
        .filter(|(_, tag)| tag == "MP-0 S")
        .map(|(secs, _)| secs)
        .collect();
    assert_eq!(stats, vec![0, 60, 120]);
}

#[tokio::test(start_paused = true)]
async fn test_gps_stream_sends_changes_only() {
    let services = services();
    services.config.set_param_value("vehicle", "stream", "5");
    services.metrics.set(V_ENV_ON, true).unwrap();
    let (_server, _connector, mut accepted) = start_with(&services, LinkTiming::default());
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;

    fake.send("MP-0 Z1").await;
    fake.initial_dump().await;
    let since = Instant::now();

    tokio::time::sleep(Duration::from_secs(2)).await;
    services.metrics.set(V_POS_LATITUDE, 51.5).unwrap();

    // Position goes out on the next stream tick, then nothing until the peer pass
    let frames = fake.collect_until(since, "MP-0 D", 1).await;
    assert_eq!(
        frames,
        vec![at(5, "MP-0 L"), at(60, "MP-0 S"), at(60, "MP-0 D")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_network_loss_disconnects() {
    let services = services();
    let (server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;
    eventually(|| services.metrics.as_bool(S_V2_CONNECTED, false)).await;

    services.network.set_connected(false);
    while fake.recv().await.is_some() {}
    assert!(!services.metrics.as_bool(S_V2_CONNECTED, true));
    eventually(|| server.status() == "Waiting for network connectivity").await;
}

#[tokio::test]
async fn test_group_config_change_applies_to_next_dump() {
    let services = services();
    let (_server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    let dump = fake.initial_dump().await;
    assert!(!dump.iter().any(|f| f.starts_with("MP-0 g")));

    services.config.set_param_value("server.v2", "groups", "fleet");
    fake.send("MP-0 Z1").await;
    let dump = fake.initial_dump().await;
    assert!(dump.iter().any(|f| f.starts_with("MP-0 gfleet,")));
}

#[tokio::test]
async fn test_stop_tears_down_before_returning() {
    let services = services();
    let mut events = services.events.subscribe();
    let (mut server, _connector, mut accepted) = start(&services);
    let mut fake = FakeServer::accept(&mut accepted).await;
    fake.initial_dump().await;
    eventually(|| services.metrics.as_bool(S_V2_CONNECTED, false)).await;

    server.stop().await;
    assert_eq!(server.status(), "Stopped");
    assert!(!server.is_running());
    assert!(!services.metrics.as_bool(S_V2_CONNECTED, true));
    assert_eq!(fake.recv().await, None);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    assert_eq!(names.last().map(String::as_str), Some("server.v2.disconnected"));

    // Reader is gone, so nothing is held for the link any more
    services.notify.raise(NotifyType::Info, "test", "after stop");
    assert!(services.notify.is_empty(NotifyType::Info));
}
