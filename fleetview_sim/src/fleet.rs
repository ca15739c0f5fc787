//! Ground-truth fleet for the simulator.
//!
//! The Fleet owns every simulated entity:
//! - Initial placement on freshly generated routes
//! - Per-tick availability rolls and kinematics
//! - Route regeneration for entities whose state went bad
//! - The snapshot of available entities sent to observers

use fleetview_core::availability::{AvailabilityModel, Transition};
use fleetview_core::config::{RouteConfig, SimConfig};
use fleetview_core::geo::Waypoint;
use fleetview_core::kinematics::{advance, KinematicsError, MotionParams};
use fleetview_core::protocol::ObjectState;
use fleetview_core::route::{generate_route, RouteError};
use fleetview_core::Entity;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Everything a tick needs besides the entities and the RNG.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRules {
    pub motion: MotionParams,
    pub availability: AvailabilityModel,

    /// Center used when an entity needs a new route
    pub center: Waypoint,
    pub route: RouteConfig,
}

impl TickRules {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            motion: MotionParams::from_config(config),
            availability: AvailabilityModel::from_config(config),
            center: config.center,
            route: config.route.clone(),
        }
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Entities stepped by kinematics
    pub moved: usize,
    pub went_offline: usize,
    pub reactivated: usize,

    /// Steps that snapped onto the target instead of moving freely
    pub snapped: usize,

    /// Waypoint arrivals
    pub advanced: usize,

    /// Entities put on a fresh route after an invariant violation
    pub recovered: usize,
}

/// The entity arena. Index order is id order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fleet {
    entities: Vec<Entity>,
}

impl Fleet {
    /// Places `config.entity_count` entities on fresh routes.
    pub fn generate<R: Rng + ?Sized>(config: &SimConfig, rng: &mut R) -> Result<Self, RouteError> {
        let entities = (0..config.entity_count)
            .map(|index| {
                let route = generate_route(config.center, &config.route, rng)?;
                let speed = rng.gen_range(config.min_speed_kmh..=config.max_speed_kmh);
                Entity::new(Entity::fleet_id(index), route, speed)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entities })
    }

    /// Advances every entity by one tick.
    ///
    /// Availability is rolled first. An entity that drops out this tick
    /// stays where it is; one that comes back moves this tick.
    pub fn tick<R: Rng + ?Sized>(&mut self, rules: &TickRules, rng: &mut R) -> TickReport {
        let mut report = TickReport::default();

        for entity in &mut self.entities {
            match rules.availability.roll(entity, rng) {
                Some(Transition::WentOffline) => {
                    report.went_offline += 1;
                    debug!(id = %entity.id, "Entity went offline");
                    continue;
                }
                Some(Transition::Reactivated) => {
                    report.reactivated += 1;
                    debug!(id = %entity.id, "Entity reactivated");
                }
                None => {}
            }

            if !entity.available {
                continue;
            }

            match advance(entity, &rules.motion, rng) {
                Ok(step) => {
                    report.moved += 1;
                    report.snapped += usize::from(step.snapped);
                    report.advanced += usize::from(step.advanced);
                }
                Err(violation) => {
                    recover(entity, violation, rules, rng);
                    report.recovered += 1;
                }
            }
        }

        report
    }

    /// Wire view of every available entity, in id order.
    pub fn snapshot(&self) -> Vec<ObjectState> {
        self.entities
            .iter()
            .filter(|e| e.available)
            .map(Entity::object_state)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entities.iter().filter(|e| e.available).count()
    }
}

/// Puts an entity whose state broke onto a brand new route.
fn recover<R: Rng + ?Sized>(entity: &mut Entity, violation: KinematicsError, rules: &TickRules, rng: &mut R) {
    warn!(id = %entity.id, %violation, "Regenerating route");

    if !entity.speed.is_finite() {
        entity.speed = rules.motion.min_speed_kmh;
    }
    let result = generate_route(rules.center, &rules.route, rng).and_then(|route| entity.reset_route(route));
    if let Err(e) = result {
        // Keep it out of snapshots until a later tick manages to recover it
        error!(id = %entity.id, error = %e, "Route regeneration failed");
        entity.available = false;
    }
}
