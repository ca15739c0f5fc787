//! FleetView Environment Abstraction Layer
//!
//! This crate provides the seams between the FleetView engines and the
//! outside world, so the same simulator and observer code runs against
//! the real clock (tokio) or a virtual clock in tests.
//!
//! # What is abstracted
//!
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Observer delivery (`ObserverChannel::try_deliver()`)
//!
//! # Example
//!
//! ```ignore
//! use fleetview_env::{FleetContext, ObserverChannel};
//!
//! async fn tick_loop<Ctx: FleetContext>(ctx: &Ctx, observers: &[Box<dyn ObserverChannel>]) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(1)).await;
//!         for observer in observers {
//!             let _ = observer.try_deliver(frame.clone());
//!         }
//!     }
//! }
//! ```

mod channel;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use channel::{ObserverChannel, QueuedChannel};
pub use context::FleetContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::{Frame, ObserverId};
