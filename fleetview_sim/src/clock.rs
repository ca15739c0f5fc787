//! SimClock - the fixed-interval driver of the simulation.
//!
//! One task owns the fleet. Each tick rolls availability, steps kinematics
//! and broadcasts the snapshot of available entities:
//!
//! ```text
//!   deadline ──► Fleet::tick ──► Fleet::snapshot ──► BroadcastSink::broadcast
//!      ▲                                                        │
//!      └──────────────── previous deadline + interval ◄─────────┘
//! ```
//!
//! A tick that overruns its slot makes the next one start immediately and
//! restarts the schedule from there; missed ticks are never replayed.

use crate::broadcast::{BroadcastReport, BroadcastSink};
use crate::error::SimError;
use crate::fleet::{Fleet, TickReport, TickRules};

use fleetview_core::config::SimConfig;
use fleetview_env::FleetContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockTick {
    pub tick: u64,
    pub timestamp: u64,
    pub fleet: TickReport,
    pub broadcast: BroadcastReport,
}

/// The simulation clock. Build with [`SimClock::new`], then either call
/// [`SimClock::tick`] directly or hand it to a task with [`SimClock::spawn`].
pub struct SimClock<Ctx: FleetContext> {
    config: SimConfig,
    rules: TickRules,
    fleet: Fleet,

    /// Single RNG for the whole run: route generation, flips and jitter
    rng: ChaCha8Rng,

    context: Arc<Ctx>,
    sink: Arc<BroadcastSink>,
    tick_count: Arc<AtomicU64>,
}

impl<Ctx: FleetContext> SimClock<Ctx> {
    /// Validates the configuration, generates the fleet and seeds the sink's
    /// baseline with it, so observers joining before the first tick still
    /// get the whole fleet as `init`.
    ///
    /// A seed of 0 draws the RNG seed from OS entropy.
    pub fn new(config: SimConfig, context: Arc<Ctx>, sink: Arc<BroadcastSink>) -> Result<Self, SimError> {
        config.validate()?;

        let mut rng = if config.seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(config.seed)
        };
        let fleet = Fleet::generate(&config, &mut rng)?;
        sink.set_baseline(context.unix_millis(), fleet.snapshot());

        info!(
            entities = fleet.len(),
            tick_ms = config.tick_interval_ms,
            seed = config.seed,
            "Fleet generated"
        );

        Ok(Self {
            rules: TickRules::from_config(&config),
            config,
            fleet,
            rng,
            context,
            sink,
            tick_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Runs one tick and broadcasts its snapshot.
    pub fn tick(&mut self) -> Result<ClockTick, SimError> {
        let fleet = self.fleet.tick(&self.rules, &mut self.rng);
        let timestamp = self.context.unix_millis();
        let broadcast = self.sink.broadcast(timestamp, self.fleet.snapshot())?;
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(
            tick,
            moved = fleet.moved,
            offline = fleet.went_offline,
            back = fleet.reactivated,
            arrivals = fleet.advanced,
            observers = broadcast.delivered,
            "Tick"
        );
        if fleet.recovered > 0 {
            warn!(tick, recovered = fleet.recovered, "Entities put on new routes");
        }

        Ok(ClockTick {
            tick,
            timestamp,
            fleet,
            broadcast,
        })
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    /// Moves the clock onto its own task.
    pub fn spawn(self) -> ClockHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticks = Arc::clone(&self.tick_count);
        let join = tokio::spawn(self.run(shutdown_rx));

        ClockHandle {
            shutdown: shutdown_tx,
            join,
            ticks,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Fleet {
        let interval = self.config.tick_interval();
        let mut deadline = self.context.now() + interval;

        loop {
            let wait = deadline.saturating_sub(self.context.now());
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = self.context.sleep(wait) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick() {
                error!(error = %e, "Tick failed");
            }

            let now = self.context.now();
            let scheduled = deadline + interval;
            if now > scheduled {
                warn!(late_ms = (now - scheduled).as_millis() as u64, "Tick overran its slot");
            }
            deadline = next_deadline(deadline, interval, now);
        }

        info!(ticks = self.tick_count(), "Simulation clock stopped");
        self.fleet
    }
}

/// Deadline of the tick after one scheduled for `deadline`, given it finished at `now`.
fn next_deadline(deadline: Duration, interval: Duration, now: Duration) -> Duration {
    let next = deadline + interval;
    if next < now {
        now
    } else {
        next
    }
}

/// Owned cancel handle for a running clock.
pub struct ClockHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<Fleet>,
    ticks: Arc<AtomicU64>,
}

impl ClockHandle {
    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// A counter that outlives the handle.
    pub fn tick_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.ticks)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the clock and returns the fleet.
    ///
    /// Once this returns no further tick or broadcast happens.
    pub async fn stop(self) -> Result<Fleet, SimError> {
        let _ = self.shutdown.send(true);
        self.join.await.map_err(|e| SimError::TaskFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use fleetview_core::protocol::{ServerMessage, SnapshotKind};
    use fleetview_env::{ObserverId, QueuedChannel};

    fn config() -> SimConfig {
        SimConfig {
            seed: 42,
            entity_count: 8,
            go_offline_probability: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig {
            tick_interval_ms: 0,
            ..config()
        };
        let result = SimClock::new(config, SimContext::shared(), Arc::new(BroadcastSink::new()));
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_seeded_clocks_agree() {
        let sink = Arc::new(BroadcastSink::new());
        let mut a = SimClock::new(config(), SimContext::shared(), sink.clone()).unwrap();
        let mut b = SimClock::new(config(), SimContext::shared(), sink).unwrap();

        for _ in 0..30 {
            a.tick().unwrap();
            b.tick().unwrap();
        }
        assert_eq!(a.fleet(), b.fleet());
        assert_eq!(a.tick_count(), 30);
    }

    #[test]
    fn test_tick_broadcasts_available_entities() {
        let context = SimContext::shared();
        let sink = Arc::new(BroadcastSink::new());
        let mut clock = SimClock::new(config(), context.clone(), sink.clone()).unwrap();
        let generated = clock.fleet().snapshot();
        let started = context.unix_millis();

        let (channel, mut rx) = QueuedChannel::new(ObserverId::from_seed(1), 8);
        sink.register(Box::new(channel)).unwrap();

        context.advance_time(Duration::from_secs(1));
        let tick = clock.tick().unwrap();
        assert_eq!(tick.tick, 1);
        assert_eq!(tick.broadcast.delivered, 1);
        assert_eq!(tick.timestamp, context.unix_millis());

        let init = ServerMessage::decode(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(init, ServerMessage::snapshot(SnapshotKind::Init, started, generated));

        match ServerMessage::decode(&rx.try_recv().unwrap()).unwrap() {
            ServerMessage::Update(snapshot) => {
                assert_eq!(snapshot.objects, clock.fleet().snapshot());
                assert_eq!(snapshot.objects.len(), 8);
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_observer_joining_before_first_tick_gets_fleet() {
        let context = SimContext::shared();
        let sink = Arc::new(BroadcastSink::new());
        let clock = SimClock::new(config(), context.clone(), sink.clone()).unwrap();

        assert_eq!(clock.tick_count(), 0);
        assert_eq!(sink.baseline(), (context.unix_millis(), clock.fleet().snapshot()));

        let (channel, mut rx) = QueuedChannel::new(ObserverId::from_seed(2), 8);
        sink.register(Box::new(channel)).unwrap();
        match ServerMessage::decode(&rx.try_recv().unwrap()).unwrap() {
            ServerMessage::Init(snapshot) => {
                assert_eq!(snapshot.timestamp, 1_704_067_200_000);
                assert_eq!(snapshot.objects.len(), 8);
                assert_eq!(snapshot.objects[0].id, "OBJ-0001");
            }
            other => panic!("expected init, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawned_clock_paces_and_stops() {
        let context = SimContext::shared();
        let sink = Arc::new(BroadcastSink::new());
        let clock = SimClock::new(config(), context.clone(), sink.clone()).unwrap();

        let (channel, mut rx) = QueuedChannel::new(ObserverId::from_seed(1), 100_000);
        sink.register(Box::new(channel)).unwrap();
        rx.recv().await.unwrap(); // init

        let handle = clock.spawn();
        let ticks = handle.tick_counter();
        while handle.ticks() < 20 {
            tokio::task::yield_now().await;
        }
        let fleet = handle.stop().await.unwrap();
        assert_eq!(fleet.len(), 8);

        let mut timestamps = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            match ServerMessage::decode(&frame).unwrap() {
                ServerMessage::Update(snapshot) => timestamps.push(snapshot.timestamp),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(timestamps.len() as u64, ticks.load(Ordering::Relaxed));
        assert!(timestamps.windows(2).all(|w| w[1] - w[0] == 1000));

        // Nothing happens after stop
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.observer_count(), 1);
    }

    #[test]
    fn test_next_deadline() {
        let second = Duration::from_secs(1);

        // On time: keep the fixed cadence
        assert_eq!(next_deadline(second, second, Duration::from_millis(1200)), Duration::from_secs(2));

        // Overran: start right away, then resume the cadence from there
        let late = Duration::from_millis(3500);
        assert_eq!(next_deadline(second, second, late), late);
        assert_eq!(next_deadline(late, second, late), late + second);
    }
}
