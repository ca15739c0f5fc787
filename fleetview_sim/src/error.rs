//! Error types for the simulator.

use fleetview_core::config::ConfigError;
use fleetview_core::route::RouteError;
use fleetview_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Fleet generation failed: {0}")]
    Route(#[from] RouteError),

    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] EnvError),

    #[error("Clock task failed: {0}")]
    TaskFailed(String),
}
