//! Configuration for the simulator and the observer-side tracker.
//!
//! Every option has a default; a JSON file may override any subset:
//!
//! ```json
//! {
//!   "sim": { "entity_count": 40, "tick_interval_ms": 500 },
//!   "tracking": { "evict_after_ms": 60000 }
//! }
//! ```

use crate::geo::Waypoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ROUTE SHAPE
// ============================================================================

/// Bounds for generated routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Minimum waypoint distance from the center, in degrees (default: 0.05)
    pub min_radius_deg: f64,

    /// Maximum waypoint distance from the center, in degrees (default: 0.25)
    pub max_radius_deg: f64,

    /// Fewest waypoints per route, inclusive (default: 5)
    pub min_waypoints: usize,

    /// Most waypoints per route, inclusive (default: 8)
    pub max_waypoints: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            min_radius_deg: 0.05,
            max_radius_deg: 0.25,
            min_waypoints: 5,
            max_waypoints: 8,
        }
    }
}

impl RouteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_waypoints < 3 {
            return Err(ConfigError::invalid("route.min_waypoints", "must be at least 3"));
        }
        if self.max_waypoints < self.min_waypoints {
            return Err(ConfigError::invalid("route.max_waypoints", "must be >= min_waypoints"));
        }
        if !(self.min_radius_deg > 0.0 && self.min_radius_deg.is_finite()) {
            return Err(ConfigError::invalid("route.min_radius_deg", "must be positive"));
        }
        if !(self.max_radius_deg >= self.min_radius_deg && self.max_radius_deg.is_finite()) {
            return Err(ConfigError::invalid("route.max_radius_deg", "must be >= min_radius_deg"));
        }
        Ok(())
    }
}

// ============================================================================
// SIMULATOR
// ============================================================================

/// Configuration for a simulator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed (0 = seed from OS entropy)
    pub seed: u64,

    /// Fixed tick interval in milliseconds (default: 1000)
    pub tick_interval_ms: u64,

    /// Number of simulated entities (default: 150)
    pub entity_count: usize,

    /// Center of every route (default: Kyiv)
    pub center: Waypoint,

    /// Route shape bounds
    pub route: RouteConfig,

    /// Distance to target, in degrees, at which a waypoint counts as reached
    pub arrival_threshold_deg: f64,

    /// Fraction of the heading error corrected per tick (default: 0.25)
    pub heading_smoothing: f64,

    /// Per-tick chance that an available entity drops out (default: 0.001)
    pub go_offline_probability: f64,

    /// Per-tick chance that an unavailable entity comes back (default: 0.05)
    pub reactivate_probability: f64,

    /// Lower speed bound in km/h (default: 30)
    pub min_speed_kmh: f64,

    /// Upper speed bound in km/h (default: 90)
    pub max_speed_kmh: f64,

    /// Largest per-tick speed perturbation in km/h (default: 1)
    pub speed_jitter_kmh: f64,

    /// Undelivered frames buffered per observer before it is dropped
    pub observer_queue_depth: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tick_interval_ms: 1000,
            entity_count: 150,
            center: Waypoint::new(50.4501, 30.5234),
            route: RouteConfig::default(),
            arrival_threshold_deg: 0.0005,
            heading_smoothing: 0.25,
            go_offline_probability: 0.001,
            reactivate_probability: 0.05,
            min_speed_kmh: 30.0,
            max_speed_kmh: 90.0,
            speed_jitter_kmh: 1.0,
            observer_queue_depth: 64,
        }
    }
}

impl SimConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route.validate()?;

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be non-zero"));
        }
        if !self.center.is_finite() {
            return Err(ConfigError::invalid("center", "must be finite"));
        }
        if !(self.arrival_threshold_deg >= 0.0 && self.arrival_threshold_deg.is_finite()) {
            return Err(ConfigError::invalid("arrival_threshold_deg", "must be >= 0"));
        }
        if !(self.heading_smoothing > 0.0 && self.heading_smoothing <= 1.0) {
            return Err(ConfigError::invalid("heading_smoothing", "must be in (0, 1]"));
        }
        for (field, p) in [
            ("go_offline_probability", self.go_offline_probability),
            ("reactivate_probability", self.reactivate_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::invalid(field, "must be in [0, 1]"));
            }
        }
        if !(self.min_speed_kmh >= 0.0 && self.max_speed_kmh >= self.min_speed_kmh) {
            return Err(ConfigError::invalid("max_speed_kmh", "must be >= min_speed_kmh >= 0"));
        }
        if !(self.speed_jitter_kmh >= 0.0 && self.speed_jitter_kmh.is_finite()) {
            return Err(ConfigError::invalid("speed_jitter_kmh", "must be >= 0"));
        }
        if self.observer_queue_depth == 0 {
            return Err(ConfigError::invalid("observer_queue_depth", "must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// OBSERVER
// ============================================================================

/// Staleness thresholds for the observer's reconciled store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Silence after which an entity is marked lost (default: half of `evict_after_ms`)
    pub lost_after_ms: Option<u64>,

    /// Silence after which an entity is removed (default: 300000 = 5 min)
    pub evict_after_ms: u64,

    /// How often the staleness sweep runs (default: 30000)
    pub sweep_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            lost_after_ms: None,
            evict_after_ms: 5 * 60 * 1000,
            sweep_interval_ms: 30 * 1000,
        }
    }
}

impl TrackingConfig {
    pub fn lost_after(&self) -> Duration {
        Duration::from_millis(self.lost_after_ms.unwrap_or(self.evict_after_ms / 2))
    }

    pub fn evict_after(&self) -> Duration {
        Duration::from_millis(self.evict_after_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evict_after_ms == 0 {
            return Err(ConfigError::invalid("evict_after_ms", "must be non-zero"));
        }
        if self.lost_after() > self.evict_after() {
            return Err(ConfigError::invalid("lost_after_ms", "must not exceed evict_after_ms"));
        }
        // At least one sweep must land in the lost window
        if self.sweep_interval_ms == 0 || self.sweep_interval() >= self.evict_after() - self.lost_after() {
            return Err(ConfigError::invalid(
                "sweep_interval_ms",
                "must be non-zero and shorter than evict_after_ms - lost_after_ms",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// FILE
// ============================================================================

/// Everything a `fleetview-sim` process can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub sim: SimConfig,
    pub tracking: TrackingConfig,
}

impl FleetConfig {
    /// Reads a JSON config file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim.validate()?;
        self.tracking.validate()
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(String),

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sim.entity_count, 150);
        assert_eq!(config.sim.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_lost_threshold_defaults_to_half_eviction() {
        let tracking = TrackingConfig {
            evict_after_ms: 300_000,
            ..Default::default()
        };
        assert_eq!(tracking.lost_after(), Duration::from_secs(150));

        let explicit = TrackingConfig {
            lost_after_ms: Some(10_000),
            ..Default::default()
        };
        assert_eq!(explicit.lost_after(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FleetConfig::from_json_str(
            r#"{ "sim": { "entity_count": 12, "route": { "max_waypoints": 6 } } }"#,
        )
        .unwrap();

        assert_eq!(config.sim.entity_count, 12);
        assert_eq!(config.sim.route.max_waypoints, 6);
        assert_eq!(config.sim.route.min_waypoints, 5);
        assert_eq!(config.tracking, TrackingConfig::default());
    }

    #[test]
    fn test_rejects_inverted_route_bounds() {
        let mut config = SimConfig::default();
        config.route.min_radius_deg = 0.3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "route.max_radius_deg", .. })
        ));

        let mut config = SimConfig::default();
        config.route.min_waypoints = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_probability() {
        let config = SimConfig {
            reactivate_probability: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "reactivate_probability", .. })
        ));
    }

    #[test]
    fn test_rejects_sweep_slower_than_eviction() {
        let tracking = TrackingConfig {
            evict_after_ms: 10_000,
            sweep_interval_ms: 20_000,
            ..Default::default()
        };
        assert!(tracking.validate().is_err());
    }

    #[test]
    fn test_rejects_sweep_that_can_skip_lost() {
        // Shorter than eviction, but longer than the 150 s lost window
        let tracking = TrackingConfig {
            evict_after_ms: 300_000,
            sweep_interval_ms: 290_000,
            ..Default::default()
        };
        assert!(matches!(
            tracking.validate(),
            Err(ConfigError::Invalid { field: "sweep_interval_ms", .. })
        ));

        let no_window = TrackingConfig {
            lost_after_ms: Some(300_000),
            evict_after_ms: 300_000,
            sweep_interval_ms: 1_000,
        };
        assert!(no_window.validate().is_err());

        let fits = TrackingConfig {
            sweep_interval_ms: 149_999,
            ..tracking
        };
        assert!(fits.validate().is_ok());
    }

    #[test]
    fn test_garbage_json_is_parse_error() {
        assert!(matches!(
            FleetConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
