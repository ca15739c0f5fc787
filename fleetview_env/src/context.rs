//! Core environment context trait for FleetView tasks.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for time.
///
/// The simulation clock and the observer runtime read time only through
/// this trait, so tests can drive them with a virtual clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `std::time` and `tokio::time`
/// - **Tests**: `SimContext` (in `fleetview_sim`) - manually advanced clock
#[async_trait]
pub trait FleetContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for tick deadlines and observer `last_seen` bookkeeping.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for message timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Milliseconds since the UNIX epoch, as carried in wire timestamps.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
