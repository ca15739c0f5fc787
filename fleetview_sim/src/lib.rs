//! FleetView Simulator
//!
//! This crate runs the simulated fleet and feeds it to observers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SimClock (one task)                      │
//! │  ┌──────────────┐   tick    ┌──────────────────────────┐    │
//! │  │ Fleet arena  │◄──────────│ availability, kinematics │    │
//! │  └──────┬───────┘           └──────────────────────────┘    │
//! │         │ snapshot (available entities)                     │
//! └─────────┼───────────────────────────────────────────────────┘
//!           ▼
//!   ┌───────────────┐  try_deliver   ┌──────────────┐   socket
//!   │ BroadcastSink │───────────────►│QueuedChannel │──────────► observer
//!   └───────────────┘  (per observer)└──────────────┘
//! ```
//!
//! Time comes from a [`fleetview_env::FleetContext`]: `TokioContext` in
//! production, [`SimContext`] for deterministic tests.
//!
//! # Usage
//!
//! ```ignore
//! use fleetview_sim::{BroadcastSink, SimClock, SimContext};
//!
//! let sink = Arc::new(BroadcastSink::new());
//! let clock = SimClock::new(SimConfig { seed: 42, ..Default::default() }, SimContext::shared(), sink)?;
//! let handle = clock.spawn();
//! let fleet = handle.stop().await?;
//! ```

mod broadcast;
mod clock;
mod context;
mod error;
mod fleet;
pub mod server;

pub use broadcast::{BroadcastReport, BroadcastSink};
pub use clock::{ClockHandle, ClockTick, SimClock};
pub use context::SimContext;
pub use error::SimError;
pub use fleet::{Fleet, TickReport, TickRules};
