//! Observer Runtime - single owner of an observer's reconciled store.
//!
//! Message ingestion, the periodic staleness sweep and disconnects all go
//! through one task, so a sweep can never interleave with an ingest of the
//! same id.
//!
//! The sweep cadence is measured on the runtime's [`FleetContext`], the same
//! clock that stamps `last_seen`. Under a virtual context sweeps follow
//! virtual time, never the wall clock.
//!
//! # Architecture
//!
//! ```text
//!  transport ──Message(text)──┐
//!  caller ─────Sweep──────────┤    ┌──────────────────────────────┐
//!  caller ─────Disconnect─────┼───►│ ObserverRuntime (one task)   │──watch──► StoreView
//!  sweep timer ───────────────┘    │  SnapshotIngestor            │          {entities, stats}
//!                                  │  ReconciledStore             │
//!                                  └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let handle = ObserverRuntime::spawn(TokioContext::shared(), TrackingConfig::default());
//! handle.deliver(text).await?;
//! println!("{:?}", handle.view().stats);
//! let exit = handle.stop().await?;
//! ```

use crate::config::TrackingConfig;
use crate::ingest::{IngestOutcome, SnapshotIngestor};
use crate::reconcile::{ReconciledStore, StoreView};
use fleetview_env::FleetContext;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth of the runtime's inbound command queue.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Inputs to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverCommand {
    /// Raw text received from the simulator
    Message(String),

    /// Run a staleness sweep now, outside the timer
    Sweep,

    /// Connection closed: forget the fleet and end the session
    Disconnect,
}

/// How a runtime session ended.
#[derive(Debug)]
pub struct ObserverExit {
    /// The store as it was when the task stopped
    pub store: ReconciledStore,

    /// Why the session ended, if not by request
    pub error: Option<String>,
}

/// Errors talking to a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    #[error("Observer runtime has stopped")]
    Stopped,

    #[error("Observer runtime task failed: {0}")]
    TaskFailed(String),
}

/// The task body. Construct through [`ObserverRuntime::spawn`].
pub struct ObserverRuntime<Ctx: FleetContext> {
    context: Arc<Ctx>,
    config: TrackingConfig,
    store: ReconciledStore,
    ingestor: SnapshotIngestor,
    view_tx: watch::Sender<StoreView>,
}

impl<Ctx: FleetContext> ObserverRuntime<Ctx> {
    /// Starts a runtime task and returns its handle.
    pub fn spawn(context: Arc<Ctx>, config: TrackingConfig) -> ObserverHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (view_tx, view_rx) = watch::channel(StoreView::default());

        let runtime = Self {
            context,
            store: ReconciledStore::from_config(&config),
            config,
            ingestor: SnapshotIngestor::new(),
            view_tx,
        };
        let join = tokio::spawn(runtime.run(command_rx, shutdown_rx));

        ObserverHandle {
            commands: command_tx,
            view: view_rx,
            shutdown: shutdown_tx,
            join,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ObserverCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ObserverExit {
        let context = Arc::clone(&self.context);
        let interval = self.config.sweep_interval();
        let mut next_sweep = context.now() + interval;

        let mut error = None;
        loop {
            let wait = next_sweep.saturating_sub(context.now());
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                command = commands.recv() => match command {
                    Some(ObserverCommand::Message(text)) => {
                        if let Some(reason) = self.handle_message(&text) {
                            warn!(%reason, "Authentication rejected, ending observer session");
                            error = Some(reason);
                            self.disconnect();
                            break;
                        }
                    }
                    Some(ObserverCommand::Sweep) => self.sweep(),
                    Some(ObserverCommand::Disconnect) | None => {
                        self.disconnect();
                        break;
                    }
                },

                // Late sweeps are not replayed; the next one is a full interval out
                _ = context.sleep(wait) => {
                    self.sweep();
                    next_sweep = context.now() + interval;
                }
            }
        }

        debug!(
            merged = self.ingestor.merged_count(),
            malformed = self.ingestor.malformed_count(),
            "Observer runtime stopped"
        );
        ObserverExit {
            store: self.store,
            error,
        }
    }

    /// Returns a rejection reason if the session must end.
    fn handle_message(&mut self, text: &str) -> Option<String> {
        let now = self.context.now();
        match self.ingestor.ingest_text(&mut self.store, text, now) {
            Ok(IngestOutcome::Merged { .. }) => {
                self.publish();
                None
            }
            Ok(IngestOutcome::AuthAccepted) => {
                info!("Authenticated with simulator");
                None
            }
            Ok(IngestOutcome::AuthRejected(reason)) => Some(reason),
            // Already logged by the ingestor
            Err(_) => None,
        }
    }

    fn sweep(&mut self) {
        let report = self.store.sweep(self.context.now());
        if report.is_empty() {
            return;
        }

        let stats = self.store.stats();
        info!(
            marked_lost = report.marked_lost.len(),
            evicted = report.evicted.len(),
            total = stats.total,
            active = stats.active,
            lost = stats.lost,
            "Staleness sweep"
        );
        self.publish();
    }

    fn disconnect(&mut self) {
        self.store.clear();
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.store.view());
    }
}

/// Owned handle to a running observer runtime.
pub struct ObserverHandle {
    commands: mpsc::Sender<ObserverCommand>,
    view: watch::Receiver<StoreView>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<ObserverExit>,
}

impl ObserverHandle {
    /// Hands a raw server message to the runtime.
    pub async fn deliver(&self, text: impl Into<String>) -> Result<(), ObserverError> {
        self.send(ObserverCommand::Message(text.into())).await
    }

    /// Requests an immediate staleness sweep.
    pub async fn sweep_now(&self) -> Result<(), ObserverError> {
        self.send(ObserverCommand::Sweep).await
    }

    /// Reports the connection as closed; the store is cleared.
    pub async fn disconnect(&self) -> Result<(), ObserverError> {
        self.send(ObserverCommand::Disconnect).await
    }

    async fn send(&self, command: ObserverCommand) -> Result<(), ObserverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ObserverError::Stopped)
    }

    /// The latest published view.
    pub fn view(&self) -> StoreView {
        self.view.borrow().clone()
    }

    /// A receiver notified after every mutation batch.
    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.view.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the task and waits for it. No sweep runs after this returns.
    pub async fn stop(self) -> Result<ObserverExit, ObserverError> {
        // Fails only if the task already ended on its own
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| ObserverError::TaskFailed(e.to_string()))
    }
}
