//! Error types for the FleetView environment abstraction.

use crate::types::ObserverId;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// The observer's receiving side is gone (socket closed, task ended)
    #[error("Observer {0} channel closed")]
    ChannelClosed(ObserverId),

    /// The observer is not draining its queue fast enough
    #[error("Observer {0} queue full")]
    QueueFull(ObserverId),

    /// Frame serialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::SerializationError(msg.to_string())
    }

    /// Returns the observer this error refers to, if any.
    pub fn observer(&self) -> Option<ObserverId> {
        match self {
            Self::ChannelClosed(id) | Self::QueueFull(id) => Some(*id),
            Self::SerializationError(_) => None,
        }
    }
}
