//! Ground-truth entity owned by the simulator.

use crate::geo::{bearing_degrees, Waypoint};
use crate::protocol::ObjectState;
use crate::route::{validate_route, RouteError};
use serde::{Deserialize, Serialize};

/// One simulated moving object.
///
/// Entities are never removed from the fleet; they toggle `available`
/// instead, keeping route and target untouched while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier (`OBJ-0001`, ...)
    pub id: String,

    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lon: f64,

    /// Compass heading in degrees, always in [0, 360)
    pub heading: f64,

    /// Speed in km/h
    pub speed: f64,

    /// Whether the entity is currently reporting
    pub available: bool,

    /// Closed loop of waypoints (at least 3)
    pub route: Vec<Waypoint>,

    /// Index of the waypoint the entity is heading for
    pub target_index: usize,
}

impl Entity {
    /// Places a new entity on the first waypoint of `route`, facing the second.
    pub fn new(id: impl Into<String>, route: Vec<Waypoint>, speed: f64) -> Result<Self, RouteError> {
        validate_route(&route)?;

        let start = route[0];
        Ok(Self {
            id: id.into(),
            lat: start.lat,
            lon: start.lon,
            heading: bearing_degrees(start, route[1]),
            speed,
            available: true,
            route,
            target_index: 1,
        })
    }

    /// Formats the fleet id for the entity at zero-based `index`.
    pub fn fleet_id(index: usize) -> String {
        format!("OBJ-{:04}", index + 1)
    }

    #[inline]
    pub fn position(&self) -> Waypoint {
        Waypoint::new(self.lat, self.lon)
    }

    pub fn set_position(&mut self, position: Waypoint) {
        self.lat = position.lat;
        self.lon = position.lon;
    }

    /// The waypoint currently steered towards, if the index is valid.
    pub fn target(&self) -> Option<Waypoint> {
        self.route.get(self.target_index).copied()
    }

    /// Replaces the route and restarts the entity on it.
    ///
    /// Used to recover from a broken route; speed and availability are kept.
    pub fn reset_route(&mut self, route: Vec<Waypoint>) -> Result<(), RouteError> {
        let fresh = Self::new(self.id.clone(), route, self.speed)?;
        *self = Self {
            available: self.available,
            ..fresh
        };
        Ok(())
    }

    /// The wire view of this entity.
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
