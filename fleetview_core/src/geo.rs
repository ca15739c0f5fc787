//! Planar geometry helpers shared by the route generator and kinematics.
//!
//! Positions are treated as a flat (lat, lon) plane measured in degrees.
//! Over the few tenths of a degree a route spans this is close enough, and
//! it keeps headings and distances consistent with each other.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Approximate degrees of latitude per kilometre (111 km per degree).
pub const DEGREES_PER_KM: f64 = 1.0 / 111.0;

/// A geographic point in degrees. Routes are made of these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The point as a planar vector `[lat, lon]`.
    #[inline]
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.lat, self.lon)
    }

    #[inline]
    pub fn from_vector(v: Vector2<f64>) -> Self {
        Self { lat: v.x, lon: v.y }
    }

    /// Planar distance to `other`, in degrees.
    pub fn distance_to(self, other: Waypoint) -> f64 {
        (other.to_vector() - self.to_vector()).norm()
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Wraps any angle in degrees into `[0, 360)`.
pub fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `[-180, 180)`.
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

/// Compass bearing from `from` to `to` (0 = north, 90 = east), in `[0, 360)`.
pub fn bearing_degrees(from: Waypoint, to: Waypoint) -> f64 {
    let d = to.to_vector() - from.to_vector();
    normalize_heading(d.y.atan2(d.x).to_degrees())
}

/// Unit vector pointing along a compass heading, as `[Δlat, Δlon]`.
pub fn heading_vector(heading: f64) -> Vector2<f64> {
    let rad = heading.to_radians();
    Vector2::new(rad.cos(), rad.sin())
}
