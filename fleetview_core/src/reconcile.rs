//! The "RECONCILE" Engine - Observer-side live fleet view
//!
//! Merges incoming snapshots into a keyed store and decays entries that stop
//! being mentioned:
//!
//! ```text
//!            mention                 age > lost_after        age > evict_after
//!   (new) ─────────────► ACTIVE ─────────────────────► LOST ─────────────────► evicted
//!                          ▲                              │
//!                          └──────────── mention ─────────┘
//! ```
//!
//! Status changes other than "mention → ACTIVE" only happen on a sweep.
//! Aggregate counts are recomputed after every mutation batch, so
//! `total == active + lost` always holds.

use crate::config::TrackingConfig;
use crate::protocol::ObjectState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// STATUS
// ============================================================================

/// Derived status of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Lost,
}

/// Where an entity stands given its silence, including the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh(EntityStatus),
    Expired,
}

/// Staleness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub lost_after: Duration,
    pub evict_after: Duration,
}

impl StalenessPolicy {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            lost_after: config.lost_after(),
            evict_after: config.evict_after(),
        }
    }

    /// Pure status derivation from `last_seen` and `now`.
    pub fn classify(&self, last_seen: Duration, now: Duration) -> Staleness {
        let silence = now.saturating_sub(last_seen);
        if silence > self.evict_after {
            Staleness::Expired
        } else if silence > self.lost_after {
            Staleness::Fresh(EntityStatus::Lost)
        } else {
            Staleness::Fresh(EntityStatus::Active)
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

// ============================================================================
// TRACKED ENTITY
// ============================================================================

/// Last known state of one entity, as seen by this observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub speed: f64,
    pub status: EntityStatus,

    /// Observer-local time of the last message mentioning this entity
    pub last_seen: Duration,

    /// Server timestamp carried by that message
    pub server_timestamp: u64,
}

impl TrackedEntity {
    fn from_object(object: ObjectState, server_timestamp: u64, now: Duration) -> Self {
        Self {
            id: object.id,
            lat: object.lat,
            lon: object.lon,
            heading: object.heading,
            speed: object.speed,
            status: EntityStatus::Active,
            last_seen: now,
            server_timestamp,
        }
    }

    pub fn object_state(&self) -> ObjectState {
        ObjectState {
            id: self.id.clone(),
            lat: self.lat,
            lon: self.lon,
            heading: self.heading,
            speed: self.speed,
        }
    }
}

// ============================================================================
// STATS / VIEWS
// ============================================================================

/// Aggregate counts over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub lost: usize,
}

/// A consistent copy of the store: entities and the counts derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreView {
    pub entities: BTreeMap<String, TrackedEntity>,
    pub stats: StoreStats,
}

impl StoreView {
    pub fn with_status(&self, status: EntityStatus) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values().filter(move |e| e.status == status)
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entities that went from active to lost
    pub marked_lost: Vec<String>,

    /// Entities removed from the store
    pub evicted: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.marked_lost.is_empty() && self.evicted.is_empty()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Keyed, staleness-aware view of the fleet.
///
/// Single-writer: whoever owns the store serializes ingest and sweep.
#[derive(Debug, Clone)]
pub struct ReconciledStore {
    /// Tracked entities keyed by id (ordered, so listings are stable)
    entities: BTreeMap<String, TrackedEntity>,

    /// Counts matching `entities`
    stats: StoreStats,

    policy: StalenessPolicy,
}

impl ReconciledStore {
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            entities: BTreeMap::new(),
            stats: StoreStats::default(),
            policy,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(StalenessPolicy::from_config(config))
    }

    /// Merges one snapshot's objects.
    ///
    /// Every mentioned id becomes (or stays) active with `last_seen = now`.
    /// Returns how many objects were merged.
    pub fn ingest(&mut self, objects: Vec<ObjectState>, server_timestamp: u64, now: Duration) -> usize {
        let count = objects.len();
        for object in objects {
            let entity = TrackedEntity::from_object(object, server_timestamp, now);
            self.entities.insert(entity.id.clone(), entity);
        }
        self.recompute_stats();
        count
    }

    /// Recomputes statuses and evicts expired entities.
    ///
    /// The whole store is classified first; removals are applied afterwards
    /// as one set difference. An entity is only evicted once a previous sweep
    /// has reported it lost: one that expired while still active is demoted
    /// to lost and evicted on the next sweep.
    pub fn sweep(&mut self, now: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        for entity in self.entities.values_mut() {
            match self.policy.classify(entity.last_seen, now) {
                Staleness::Expired if entity.status == EntityStatus::Active => {
                    report.marked_lost.push(entity.id.clone());
                    entity.status = EntityStatus::Lost;
                }
                Staleness::Expired => report.evicted.push(entity.id.clone()),
                Staleness::Fresh(status) => {
                    if entity.status == EntityStatus::Active && status == EntityStatus::Lost {
                        report.marked_lost.push(entity.id.clone());
                    }
                    entity.status = status;
                }
            }
        }

        for id in &report.evicted {
            self.entities.remove(id);
        }

        self.recompute_stats();
        report
    }

    /// What a sweep at `now` would decide for `id`. Does not mutate.
    pub fn status_at(&self, id: &str, now: Duration) -> Option<Staleness> {
        self.entities
            .get(id)
            .map(|e| self.policy.classify(e.last_seen, now))
    }

    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.all().filter(|e| e.status == EntityStatus::Active)
    }

    pub fn lost(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.all().filter(|e| e.status == EntityStatus::Lost)
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Consistent `{entities, stats}` pair.
    pub fn view(&self) -> StoreView {
        StoreView {
            entities: self.entities.clone(),
            stats: self.stats,
        }
    }

    /// Forgets everything (used on disconnect).
    pub fn clear(&mut self) {
        self.entities.clear();
        self.recompute_stats();
    }

    fn recompute_stats(&mut self) {
        let total = self.entities.len();
        let active = self.active().count();
        self.stats = StoreStats {
            total,
            active,
            lost: total - active,
        };
    }
}

impl Default for ReconciledStore {
    fn default() -> Self {
        Self::new(StalenessPolicy::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
