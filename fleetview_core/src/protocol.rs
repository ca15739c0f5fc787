//! Wire format shared by the simulator and its observers.
//!
//! All messages are JSON objects tagged by `type`:
//!
//! ```text
//! server → observer   {"type":"init",   "timestamp":..., "objects":[{id,lat,lon,heading,speed}, ...]}
//! server → observer   {"type":"update", "timestamp":..., "objects":[...]}
//! server → observer   {"type":"auth",   "success":true|false, "error":"..."?}
//! observer → server   {"type":"auth",   "apiKey":"..."}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position report for one available entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub speed: f64,
}

/// A point-in-time list of every available entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server wall clock, milliseconds since the UNIX epoch
    pub timestamp: u64,
    pub objects: Vec<ObjectState>,
}

/// Answer to an observer's `auth` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which of the two snapshot flavours a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Baseline sent once when an observer registers
    Init,
    /// Sent every tick
    Update,
}

/// Messages pushed from the simulator to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Init(Snapshot),
    Update(Snapshot),
    Auth(AuthReply),
}

impl ServerMessage {
    pub fn snapshot(kind: SnapshotKind, timestamp: u64, objects: Vec<ObjectState>) -> Self {
        let snapshot = Snapshot { timestamp, objects };
        match kind {
            SnapshotKind::Init => Self::Init(snapshot),
            SnapshotKind::Update => Self::Update(snapshot),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

/// Messages sent from observers to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Auth {
        /// Kept loose so a wrong type is answered with a rejection rather than dropped
        #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
        api_key: Option<serde_json::Value>,
    },
}

impl ClientMessage {
    pub fn auth(api_key: impl Into<String>) -> Self {
        Self::Auth {
            api_key: Some(serde_json::Value::String(api_key.into())),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

/// Errors turning messages into or out of JSON.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}
