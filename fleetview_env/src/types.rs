//! Common types for the FleetView environment abstraction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A serialized wire message, shared between every observer it is sent to.
pub type Frame = Arc<str>;

/// Unique identifier for a connected observer.
///
/// Uses UUID v4 so transports can mint ids without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    /// Creates a new random ObserverId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ObserverId from a seed (for tests).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 chars are enough to tell observers apart in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_id_from_seed_is_stable() {
        assert_eq!(ObserverId::from_seed(7), ObserverId::from_seed(7));
        assert_ne!(ObserverId::from_seed(7), ObserverId::from_seed(8));
    }

    #[test]
    fn test_observer_id_display_is_short() {
        let id = ObserverId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
