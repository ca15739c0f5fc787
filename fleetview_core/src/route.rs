//! Route generator: closed polygonal loops around a center point.
//!
//! Each route is a ring of waypoints at evenly divided bearings (plus a
//! little jitter) and independently drawn radii, so the loops look like
//! irregular patrol circuits rather than perfect polygons.

use crate::config::RouteConfig;
use crate::geo::Waypoint;
use rand::Rng;
use std::f64::consts::{PI, TAU};
use thiserror::Error;

/// Largest bearing jitter applied to a waypoint (±10°).
pub const MAX_BEARING_JITTER: f64 = PI / 18.0;

/// Fewest distinct points a route needs for headings to be well defined.
pub const MIN_ROUTE_LEN: usize = 3;

/// Attempts before giving up on drawing a non-degenerate route.
const MAX_DRAWS: usize = 16;

/// Errors from route generation and validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("Route needs at least {MIN_ROUTE_LEN} waypoints, got {0}")]
    TooShort(usize),

    #[error("Route has fewer than {MIN_ROUTE_LEN} distinct waypoints")]
    Degenerate,

    #[error("Route contains a non-finite waypoint at index {0}")]
    NonFinite(usize),

    #[error("Invalid route bounds: {0}")]
    InvalidBounds(String),
}

/// Generates a closed route around `center`.
///
/// The waypoint count is drawn from `[min_waypoints, max_waypoints]`, the
/// base bearing from `[0, 2π)`. Each call consumes fresh randomness from
/// `rng`, so successive routes are independent.
pub fn generate_route<R: Rng + ?Sized>(
    center: Waypoint,
    bounds: &RouteConfig,
    rng: &mut R,
) -> Result<Vec<Waypoint>, RouteError> {
    bounds
        .validate()
        .map_err(|e| RouteError::InvalidBounds(e.to_string()))?;

    for _ in 0..MAX_DRAWS {
        let route = draw_route(center, bounds, rng);
        if validate_route(&route).is_ok() {
            return Ok(route);
        }
    }

    Err(RouteError::Degenerate)
}

fn draw_route<R: Rng + ?Sized>(center: Waypoint, bounds: &RouteConfig, rng: &mut R) -> Vec<Waypoint> {
    let count = rng.gen_range(bounds.min_waypoints..=bounds.max_waypoints);
    let base = rng.gen_range(0.0..TAU);
    let division = TAU / count as f64;

    (0..count)
        .map(|i| {
            let jitter = rng.gen_range(-MAX_BEARING_JITTER..=MAX_BEARING_JITTER);
            let angle = base + i as f64 * division + jitter;
            let radius = rng.gen_range(bounds.min_radius_deg..=bounds.max_radius_deg);
            Waypoint::new(
                center.lat + angle.cos() * radius,
                center.lon + angle.sin() * radius,
            )
        })
        .collect()
}

/// Checks the invariants every route must hold.
pub fn validate_route(route: &[Waypoint]) -> Result<(), RouteError> {
    if route.len() < MIN_ROUTE_LEN {
        return Err(RouteError::TooShort(route.len()));
    }
    if let Some(idx) = route.iter().position(|w| !w.is_finite()) {
        return Err(RouteError::NonFinite(idx));
    }

    let mut distinct: Vec<Waypoint> = Vec::with_capacity(route.len());
    for w in route {
        if !distinct.contains(w) {
            distinct.push(*w);
        }
    }
    if distinct.len() < MIN_ROUTE_LEN {
        return Err(RouteError::Degenerate);
    }

    Ok(())
}
