//! Per-tick route-following kinematics.
//!
//! One call to [`advance`] moves an entity a single tick along its route:
//!
//! 1. Measure the vector to the target waypoint
//! 2. Ease the heading toward the bearing of that vector
//! 3. Convert speed into a per-tick displacement in degrees
//! 4. Step along the heading, or snap onto the target if the step would
//!    not bring the entity closer
//! 5. Advance the target index when the entity started the tick within the
//!    arrival threshold
//! 6. Perturb the speed inside its band
//!
//! The step never replays: calling it twice moves the entity twice.

use crate::config::SimConfig;
use crate::entity::Entity;
use crate::geo::{bearing_degrees, heading_vector, normalize_heading, shortest_angle_delta, Waypoint, DEGREES_PER_KM};
use crate::route::{validate_route, RouteError};
use rand::Rng;
use thiserror::Error;

/// Motion constants derived from the simulator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionParams {
    /// Tick length in seconds
    pub tick_secs: f64,

    /// Distance to target, in degrees, that counts as arrival
    pub arrival_threshold_deg: f64,

    /// Fraction of the heading error corrected per tick
    pub heading_smoothing: f64,

    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub speed_jitter_kmh: f64,
}

impl MotionParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            tick_secs: config.tick_interval().as_secs_f64(),
            arrival_threshold_deg: config.arrival_threshold_deg,
            heading_smoothing: config.heading_smoothing,
            min_speed_kmh: config.min_speed_kmh,
            max_speed_kmh: config.max_speed_kmh,
            speed_jitter_kmh: config.speed_jitter_kmh,
        }
    }

    /// Distance in degrees covered in one tick at `speed_kmh`.
    #[inline]
    pub fn step_distance_deg(&self, speed_kmh: f64) -> f64 {
        speed_kmh * self.tick_secs / 3600.0 * DEGREES_PER_KM
    }
}

impl Default for MotionParams {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

/// What happened during one kinematic step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Distance to the (pre-step) target before moving
    pub distance_before: f64,

    /// Distance to the same target after moving
    pub distance_after: f64,

    /// The step would not have closed the distance, so the entity snapped onto the target
    pub snapped: bool,

    /// The target index moved to the next waypoint
    pub advanced: bool,
}

/// Errors that make an entity's state unusable for another step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("Entity {id}: broken route: {source}")]
    Route {
        id: String,
        #[source]
        source: RouteError,
    },

    #[error("Entity {id}: target index {index} out of range for route of {len}")]
    TargetOutOfRange { id: String, index: usize, len: usize },

    #[error("Entity {id}: non-finite {field}")]
    NonFinite { id: String, field: &'static str },
}

impl KinematicsError {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Route { id, .. } | Self::TargetOutOfRange { id, .. } | Self::NonFinite { id, .. } => id,
        }
    }
}

/// Checks that the entity can be stepped without producing NaN.
pub fn check_invariants(entity: &Entity) -> Result<(), KinematicsError> {
    validate_route(&entity.route).map_err(|source| KinematicsError::Route {
        id: entity.id.clone(),
        source,
    })?;

    if entity.target_index >= entity.route.len() {
        return Err(KinematicsError::TargetOutOfRange {
            id: entity.id.clone(),
            index: entity.target_index,
            len: entity.route.len(),
        });
    }

    for (field, value) in [
        ("lat", entity.lat),
        ("lon", entity.lon),
        ("heading", entity.heading),
        ("speed", entity.speed),
    ] {
        if !value.is_finite() {
            return Err(KinematicsError::NonFinite {
                id: entity.id.clone(),
                field,
            });
        }
    }

    Ok(())
}

/// Moves `entity` one tick along its route.
///
/// On error the entity is left exactly as it was.
pub fn advance<R: Rng + ?Sized>(
    entity: &mut Entity,
    params: &MotionParams,
    rng: &mut R,
) -> Result<StepOutcome, KinematicsError> {
    check_invariants(entity)?;

    let target = entity.route[entity.target_index];
    let position = entity.position();
    let distance_before = position.distance_to(target);

    // Sitting on the target gives no bearing; keep the current heading
    if distance_before > 0.0 {
        let desired = bearing_degrees(position, target);
        let delta = shortest_angle_delta(entity.heading, desired);
        entity.heading = normalize_heading(entity.heading + delta * params.heading_smoothing);
    }

    let step = params.step_distance_deg(entity.speed);
    let candidate = position.to_vector() + heading_vector(entity.heading) * step;
    let candidate_distance = (target.to_vector() - candidate).norm();

    // Snap unless the step strictly closes the distance (also catches NaN)
    let snapped = !(candidate_distance < distance_before);
    let (next, distance_after) = if snapped {
        (target, 0.0)
    } else {
        (Waypoint::from_vector(candidate), candidate_distance)
    };
    entity.set_position(next);

    let advanced = distance_before <= params.arrival_threshold_deg;
    if advanced {
        entity.target_index = (entity.target_index + 1) % entity.route.len();
    }

    let jitter = if params.speed_jitter_kmh > 0.0 {
        rng.gen_range(-params.speed_jitter_kmh..=params.speed_jitter_kmh)
    } else {
        0.0
    };
    entity.speed = (entity.speed + jitter).clamp(params.min_speed_kmh, params.max_speed_kmh);

    Ok(StepOutcome {
        distance_before,
        distance_after,
        snapped,
        advanced,
    })
}
