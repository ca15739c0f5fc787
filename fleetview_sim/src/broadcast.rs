//! Broadcast sink: fans each tick's snapshot out to every observer.

use fleetview_core::protocol::{ObjectState, ServerMessage, SnapshotKind};
use fleetview_env::{EnvError, Frame, ObserverChannel, ObserverId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that accepted the frame
    pub delivered: usize,

    /// Observers removed because they could not take the frame
    pub dropped: Vec<(ObserverId, EnvError)>,
}

struct Registry {
    observers: HashMap<ObserverId, Box<dyn ObserverChannel>>,

    /// Last broadcast, replayed as `init` to newcomers
    baseline_timestamp: u64,
    baseline: Vec<ObjectState>,
}

/// Registry of observer channels plus the latest baseline.
///
/// Registration and broadcast take the same lock, so a new observer gets
/// its `init` strictly before any `update` sent after it joined. The lock is
/// never held across an await point; delivery is `try_deliver` only.
pub struct BroadcastSink {
    registry: Mutex<Registry>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                observers: HashMap::new(),
                baseline_timestamp: 0,
                baseline: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an observer and hands it the current baseline as `init`.
    ///
    /// An observer that cannot take even the `init` frame is not registered.
    pub fn register(&self, channel: Box<dyn ObserverChannel>) -> Result<(), EnvError> {
        let id = channel.id();
        let mut registry = self.lock();

        let init = encode(
            SnapshotKind::Init,
            registry.baseline_timestamp,
            registry.baseline.clone(),
        )?;
        channel.try_deliver(init)?;

        registry.observers.insert(id, channel);
        info!(observer = %id, observers = registry.observers.len(), "Observer registered");
        Ok(())
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registry = self.lock();
        let removed = registry.observers.remove(&id).is_some();
        if removed {
            info!(observer = %id, observers = registry.observers.len(), "Observer unregistered");
        }
        removed
    }

    /// Sends one `update` to every observer and records it as the new baseline.
    ///
    /// Observers whose channel is closed or full are dropped; the rest are
    /// unaffected.
    pub fn broadcast(&self, timestamp: u64, objects: Vec<ObjectState>) -> Result<BroadcastReport, EnvError> {
        let frame = encode(SnapshotKind::Update, timestamp, objects.clone())?;

        let mut registry = self.lock();
        let mut report = BroadcastReport::default();

        for (id, channel) in &registry.observers {
            match channel.try_deliver(Frame::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.dropped.push((*id, e)),
            }
        }

        for (id, reason) in &report.dropped {
            registry.observers.remove(id);
            warn!(observer = %id, %reason, "Dropping observer");
        }

        registry.baseline_timestamp = timestamp;
        registry.baseline = objects;

        debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            bytes = frame.len(),
            "Broadcast update"
        );
        Ok(report)
    }

    /// Replaces the baseline without sending anything.
    ///
    /// Used to seed newcomers with the fleet as it stands before the first tick.
    pub fn set_baseline(&self, timestamp: u64, objects: Vec<ObjectState>) {
        let mut registry = self.lock();
        registry.baseline_timestamp = timestamp;
        registry.baseline = objects;
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// The baseline a newly registering observer would receive.
    pub fn baseline(&self) -> (u64, Vec<ObjectState>) {
        let registry = self.lock();
        (registry.baseline_timestamp, registry.baseline.clone())
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(kind: SnapshotKind, timestamp: u64, objects: Vec<ObjectState>) -> Result<Frame, EnvError> {
    ServerMessage::snapshot(kind, timestamp, objects)
        .encode()
        .map(Frame::from)
        .map_err(EnvError::serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_env::QueuedChannel;
    use tokio::sync::mpsc;

    fn object(id: &str) -> ObjectState {
        ObjectState {
            id: id.to_string(),
            lat: 50.45,
            lon: 30.52,
            heading: 90.0,
            speed: 45.0,
        }
    }

    fn observer(seed: u64, depth: usize) -> (Box<dyn ObserverChannel>, mpsc::Receiver<Frame>) {
        let (channel, rx) = QueuedChannel::new(ObserverId::from_seed(seed), depth);
        (Box::new(channel), rx)
    }

    fn decode(frame: Frame) -> ServerMessage {
        ServerMessage::decode(&frame).unwrap()
    }

    #[test]
    fn test_init_precedes_updates() {
        let sink = BroadcastSink::new();
        sink.broadcast(100, vec![object("OBJ-0001")]).unwrap();

        let (channel, mut rx) = observer(1, 8);
        sink.register(channel).unwrap();
        sink.broadcast(200, vec![object("OBJ-0001"), object("OBJ-0002")]).unwrap();

        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Init(snapshot) => {
                assert_eq!(snapshot.timestamp, 100);
                assert_eq!(snapshot.objects, vec![object("OBJ-0001")]);
            }
            other => panic!("expected init, got {:?}", other),
        }
        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Update(snapshot) => assert_eq!(snapshot.objects.len(), 2),
            other => panic!("expected update, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_init_before_first_tick_is_empty() {
        let sink = BroadcastSink::new();
        let (channel, mut rx) = observer(1, 8);
        sink.register(channel).unwrap();

        assert_eq!(
            decode(rx.try_recv().unwrap()),
            ServerMessage::snapshot(SnapshotKind::Init, 0, vec![])
        );
    }

    #[test]
    fn test_seeded_baseline_becomes_init() {
        let sink = BroadcastSink::new();
        let (early, mut early_rx) = observer(1, 8);
        sink.register(early).unwrap();

        sink.set_baseline(50, vec![object("OBJ-0001"), object("OBJ-0002")]);
        assert_eq!(sink.baseline(), (50, vec![object("OBJ-0001"), object("OBJ-0002")]));

        // Seeding is silent for observers already registered
        early_rx.try_recv().unwrap();
        assert!(early_rx.try_recv().is_err());

        let (late, mut late_rx) = observer(2, 8);
        sink.register(late).unwrap();
        assert_eq!(
            decode(late_rx.try_recv().unwrap()),
            ServerMessage::snapshot(SnapshotKind::Init, 50, vec![object("OBJ-0001"), object("OBJ-0002")])
        );
    }

    #[test]
    fn test_full_observer_dropped_without_affecting_others() {
        let sink = BroadcastSink::new();
        let (slow, _slow_rx) = observer(1, 1);
        let (fast, mut fast_rx) = observer(2, 16);
        sink.register(slow).unwrap();
        sink.register(fast).unwrap();

        // The slow observer's only slot is taken by its init frame
        let report = sink.broadcast(1, vec![object("OBJ-0001")]).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![(ObserverId::from_seed(1), EnvError::QueueFull(ObserverId::from_seed(1)))]);
        assert_eq!(sink.observer_count(), 1);

        let report = sink.broadcast(2, vec![object("OBJ-0001")]).unwrap();
        assert_eq!(report.delivered, 1);
        assert!(report.dropped.is_empty());

        let frames: Vec<_> = std::iter::from_fn(|| fast_rx.try_recv().ok()).collect();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_closed_observer_dropped() {
        let sink = BroadcastSink::new();
        let (gone, gone_rx) = observer(1, 8);
        let (alive, _alive_rx) = observer(2, 8);
        sink.register(gone).unwrap();
        sink.register(alive).unwrap();
        drop(gone_rx);

        let report = sink.broadcast(1, vec![]).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped[0].1, EnvError::ChannelClosed(ObserverId::from_seed(1)));
        assert_eq!(sink.observer_count(), 1);
    }

    #[test]
    fn test_register_fails_for_closed_channel() {
        let sink = BroadcastSink::new();
        let (channel, rx) = observer(1, 8);
        drop(rx);

        assert!(sink.register(channel).is_err());
        assert_eq!(sink.observer_count(), 0);
    }

    #[test]
    fn test_unregister() {
        let sink = BroadcastSink::new();
        let (channel, _rx) = observer(3, 8);
        sink.register(channel).unwrap();

        assert!(sink.unregister(ObserverId::from_seed(3)));
        assert!(!sink.unregister(ObserverId::from_seed(3)));
        assert_eq!(sink.observer_count(), 0);
    }
}
