//! Snapshot ingestor: raw server text in, store mutations out.

use crate::protocol::{ProtocolError, ServerMessage, SnapshotKind};
use crate::reconcile::ReconciledStore;
use std::time::Duration;
use tracing::{debug, warn};

/// What one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A snapshot was merged into the store
    Merged { kind: SnapshotKind, count: usize },

    /// The server accepted our API key
    AuthAccepted,

    /// The server rejected our API key; the session is over
    AuthRejected(String),
}

/// Parses server messages and merges snapshots into a store.
///
/// Keeps running counts for diagnostics.
#[derive(Debug, Default)]
pub struct SnapshotIngestor {
    merged: u64,
    malformed: u64,
}

impl SnapshotIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one raw text message.
    ///
    /// Malformed input is logged and returned as an error; the store is not
    /// touched.
    pub fn ingest_text(
        &mut self,
        store: &mut ReconciledStore,
        text: &str,
        now: Duration,
    ) -> Result<IngestOutcome, ProtocolError> {
        match ServerMessage::decode(text) {
            Ok(message) => Ok(self.ingest_message(store, message, now)),
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, len = text.len(), "Dropping malformed server message");
                Err(e)
            }
        }
    }

    /// Applies an already decoded message.
    pub fn ingest_message(
        &mut self,
        store: &mut ReconciledStore,
        message: ServerMessage,
        now: Duration,
    ) -> IngestOutcome {
        let (kind, snapshot) = match message {
            ServerMessage::Init(snapshot) => (SnapshotKind::Init, snapshot),
            ServerMessage::Update(snapshot) => (SnapshotKind::Update, snapshot),
            ServerMessage::Auth(reply) if reply.success => return IngestOutcome::AuthAccepted,
            ServerMessage::Auth(reply) => {
                let reason = reply
                    .error
                    .unwrap_or_else(|| "Authentication failed".to_string());
                return IngestOutcome::AuthRejected(reason);
            }
        };

        let count = store.ingest(snapshot.objects, snapshot.timestamp, now);
        self.merged += 1;
        debug!(?kind, count, server_ts = snapshot.timestamp, "Merged snapshot");

        IngestOutcome::Merged { kind, count }
    }

    /// Number of snapshots merged so far.
    pub fn merged_count(&self) -> u64 {
        self.merged
    }

    /// Number of messages dropped as malformed.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }
}
