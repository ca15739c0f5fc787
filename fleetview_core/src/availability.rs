//! Availability model: rare, short "lost signal" episodes.
//!
//! An available entity drops out with a small per-tick probability and an
//! unavailable one comes back with a larger one, so outages are short and
//! never permanent. Nothing but the `available` flag is touched.

use crate::config::SimConfig;
use crate::entity::Entity;
use rand::Rng;

/// A change of availability produced by one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOffline,
    Reactivated,
}

/// Per-tick flip probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvailabilityModel {
    pub go_offline_probability: f64,
    pub reactivate_probability: f64,
}

impl AvailabilityModel {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            go_offline_probability: config.go_offline_probability,
            reactivate_probability: config.reactivate_probability,
        }
    }

    /// Rolls once for `entity`, flipping `available` on success.
    pub fn roll<R: Rng + ?Sized>(&self, entity: &mut Entity, rng: &mut R) -> Option<Transition> {
        let p = if entity.available {
            self.go_offline_probability
        } else {
            self.reactivate_probability
        };

        if rng.gen::<f64>() >= p {
            return None;
        }

        entity.available = !entity.available;
        Some(if entity.available {
            Transition::Reactivated
        } else {
            Transition::WentOffline
        })
    }
}

impl Default for AvailabilityModel {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}
