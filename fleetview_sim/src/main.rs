//! FleetView simulator CLI
//!
//! Simulates a fleet moving around its routes and streams positions to
//! WebSocket observers. Optionally runs an observer in-process and logs
//! what it sees.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fleetview_core::config::{FleetConfig, TrackingConfig};
use fleetview_core::ObserverRuntime;
use fleetview_env::{ObserverId, QueuedChannel, TokioContext};
use fleetview_sim::server::{self, ServerState};
use fleetview_sim::{BroadcastSink, SimClock};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetview-sim")]
#[command(about = "Simulate a vehicle fleet and stream its positions to observers", long_about = None)]
struct Args {
    /// JSON configuration file; absent fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed for determinism (0 = random)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of simulated entities
    #[arg(short, long)]
    entities: Option<usize>,

    /// Tick interval in milliseconds
    #[arg(short, long)]
    tick_ms: Option<u64>,

    /// Address the WebSocket endpoint listens on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Run an in-process observer and log its fleet statistics
    #[arg(long)]
    observe: bool,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print a JSON run summary on exit
    #[arg(long)]
    json: bool,
}

impl Args {
    fn load_config(&self) -> Result<FleetConfig> {
        let mut config = match &self.config {
            Some(path) => FleetConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => FleetConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.sim.seed = seed;
        }
        if let Some(entities) = self.entities {
            config.sim.entity_count = entities;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.sim.tick_interval_ms = tick_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = args.load_config()?;
    info!("FleetView simulator v{}", env!("CARGO_PKG_VERSION"));

    let sink = Arc::new(BroadcastSink::new());
    let clock = SimClock::new(config.sim.clone(), TokioContext::shared(), Arc::clone(&sink))?;

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    let state = ServerState {
        sink: Arc::clone(&sink),
        queue_depth: config.sim.observer_queue_depth,
    };
    let mut server = tokio::spawn(server::serve(listener, state));

    let (stop_tx, stop_rx) = watch::channel(false);
    let observer = args.observe.then(|| {
        tokio::spawn(observe(
            Arc::clone(&sink),
            config.tracking.clone(),
            config.sim.observer_queue_depth,
            stop_rx,
        ))
    });

    let clock = clock.spawn();

    let deadline = async {
        if args.duration == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
        _ = deadline => info!(secs = args.duration, "Duration reached, shutting down"),
        exit = &mut server => match exit {
            Ok(Ok(())) => bail!("WebSocket endpoint stopped unexpectedly"),
            Ok(Err(e)) => return Err(e).context("WebSocket endpoint failed"),
            Err(e) => return Err(e).context("WebSocket endpoint task failed"),
        },
    }

    let _ = stop_tx.send(true);
    if let Some(observer) = observer {
        observer.await.context("observer task failed")??;
    }

    let ticks = clock.ticks();
    let fleet = clock.stop().await?;
    server.abort();

    if args.json {
        let summary = serde_json::json!({
            "ticks": ticks,
            "entities": fleet.len(),
            "available": fleet.available_count(),
            "observers": sink.observer_count(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            ticks,
            entities = fleet.len(),
            available = fleet.available_count(),
            "Simulation finished"
        );
    }

    Ok(())
}

/// In-process observer: subscribes to the sink like a remote client would
/// and reports the reconciled view every sweep interval.
async fn observe(
    sink: Arc<BroadcastSink>,
    tracking: TrackingConfig,
    queue_depth: usize,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let mut report = tokio::time::interval(tracking.sweep_interval());
    let runtime = ObserverRuntime::spawn(TokioContext::shared(), tracking);

    let (channel, mut frames) = QueuedChannel::new(ObserverId::new(), queue_depth);
    sink.register(Box::new(channel))?;

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            frame = frames.recv() => match frame {
                Some(frame) => runtime.deliver(frame.to_string()).await?,
                None => {
                    warn!("In-process observer was dropped by the broadcast sink");
                    break;
                }
            },
            _ = report.tick() => {
                let stats = runtime.view().stats;
                info!(total = stats.total, active = stats.active, lost = stats.lost, "Observer view");
            }
        }
    }

    // Already gone if the session ended on its own
    let _ = runtime.disconnect().await;
    let exit = runtime.stop().await?;
    if let Some(reason) = exit.error {
        warn!(%reason, "Observer session ended with an error");
    }
    Ok(())
}
