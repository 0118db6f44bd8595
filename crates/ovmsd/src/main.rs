//! ovmsd - OVMS module daemon
//!
//! Runs the protocol v2 server link on top of in-process stores, a demo
//! vehicle and a small console.
//!
//! Usage:
//!   ovmsd [--config ovms.toml] [--offline]
//!
//! The config file holds one table per parameter. A `[metrics]` table seeds
//! metric values at startup:
//!
//! ```toml
//! [vehicle]
//! id = "DEMO1"
//!
//! ["server.v2"]
//! server = "ovms.example.com"
//! password = "secret"
//!
//! [metrics]
//! "v.b.soc" = 80
//! ```

mod shell;
mod vehicle;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ovms_core::metrics::standard::{M_MONOTONIC, M_VERSION, V_TYPE};
use ovms_core::{ConfigStore, EventBus, MetricValue, Metrics, Services, SystemControl};
use ovms_v2::{registry, ServerOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::shell::ConsoleShell;
use crate::vehicle::DemoVehicle;

#[derive(Parser, Debug)]
#[command(name = "ovmsd")]
#[command(author, version, about = "OVMS module daemon with the v2 server link")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "OVMSD_CONFIG")]
    config: Option<PathBuf>,

    /// Start with the network marked down
    #[arg(long)]
    offline: bool,

    /// Read console commands from stdin
    #[arg(long)]
    console: bool,
}

/// Restart by exiting; the supervisor brings the daemon back
struct ProcessRestart;

impl SystemControl for ProcessRestart {
    fn restart(&self) {
        tracing::warn!("Restart requested, exiting");
        std::process::exit(0);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ovmsd=info,ovms_v2=info,ovms_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ovmsd");
    let args = Args::parse();

    let events = EventBus::new();
    let (config, seed) = match &args.config {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            load_config(path, &events)?
        }
        None => {
            tracing::info!("No config file provided, server link will wait for configuration");
            (ConfigStore::with_events(events.clone()), BTreeMap::new())
        }
    };

    let services = Services::with_config(config, events);
    seed_metrics(&services.metrics, seed);
    services
        .metrics
        .set(M_VERSION, env!("CARGO_PKG_VERSION"))
        .context("setting module version")?;

    let vehicle = Arc::new(DemoVehicle::new(services.metrics.clone()));
    services
        .metrics
        .set(V_TYPE, "DEMO")
        .context("setting vehicle type")?;
    services.vehicles.set_active(vehicle);

    let shell = Arc::new(ConsoleShell::new(
        services.metrics.clone(),
        services.notify.clone(),
    ));
    let services = services
        .with_shell(shell.clone())
        .with_system(Arc::new(ProcessRestart));

    spawn_monotonic_ticker(services.metrics.clone());
    services.network.set_connected(!args.offline);

    registry::start(services.clone(), ServerOptions::default())?;

    if args.console {
        tokio::spawn(run_console(shell));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    registry::stop().await;
    Ok(())
}

/// Load the config store and pull out the `[metrics]` seed table
fn load_config(
    path: &Path,
    events: &EventBus,
) -> anyhow::Result<(ConfigStore, BTreeMap<String, MetricValue>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let (params, seed) = split_metric_seed(&content)?;

    let config = ConfigStore::with_events(events.clone());
    config
        .load_toml_str(&params)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok((config, seed))
}

/// Separate the `[metrics]` table from the parameter tables
fn split_metric_seed(content: &str) -> anyhow::Result<(String, BTreeMap<String, MetricValue>)> {
    let mut table: toml::Table = toml::from_str(content)?;
    let seed = match table.remove("metrics") {
        Some(value) => value.try_into().context("parsing [metrics]")?,
        None => BTreeMap::new(),
    };
    Ok((toml::to_string(&table)?, seed))
}

fn seed_metrics(metrics: &Metrics, seed: BTreeMap<String, MetricValue>) {
    for (name, value) in seed {
        if let Err(e) = metrics.set(&name, value) {
            tracing::warn!("Ignoring seed value: {}", e);
        }
    }
}

fn spawn_monotonic_ticker(metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut seconds: i64 = 0;
        loop {
            ticker.tick().await;
            if let Err(e) = metrics.set(M_MONOTONIC, seconds) {
                tracing::error!(?e, "Monotonic ticker stopped");
                return;
            }
            seconds += 1;
        }
    });
}

async fn run_console(shell: Arc<ConsoleShell>) {
    use ovms_core::CommandShell;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        println!("{}", shell.execute(line).await);
    }
}
