//! FleetView Core - Simulated fleet motion and observer-side reconciliation
//!
//! This library covers both ends of a live fleet feed:
//! 1. **Motion**: closed-loop waypoint routes, per-tick kinematics and an
//!    availability model for a fleet of simulated vehicles
//! 2. **Wire**: the JSON `init` / `update` / `auth` messages exchanged with observers
//! 3. **Reconciliation**: a keyed store that merges snapshots and decays
//!    silent entities to `lost` and then out of the view

pub mod auth;
pub mod availability;
pub mod config;
pub mod entity;
pub mod geo;
pub mod ingest;
pub mod kinematics;
pub mod observer_runtime;
pub mod protocol;
pub mod reconcile;
pub mod route;

// Re-export key types for convenience
pub use auth::{authenticate, handle_client_text, AuthError, ClientResponse};
pub use availability::{AvailabilityModel, Transition};
pub use config::{ConfigError, FleetConfig, RouteConfig, SimConfig, TrackingConfig};
pub use entity::Entity;
pub use geo::Waypoint;
pub use ingest::{IngestOutcome, SnapshotIngestor};
pub use kinematics::{advance, KinematicsError, MotionParams, StepOutcome};
pub use observer_runtime::{ObserverCommand, ObserverExit, ObserverHandle, ObserverRuntime};
pub use protocol::{ClientMessage, ObjectState, ProtocolError, ServerMessage, Snapshot, SnapshotKind};
pub use reconcile::{EntityStatus, ReconciledStore, StalenessPolicy, StoreStats, StoreView, SweepReport};
pub use route::{generate_route, validate_route, RouteError};
