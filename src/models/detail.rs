use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::stats::SessionStats;

/// Outcome of one detail request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DetailOutcome {
    /// Formatted packet description
    Description(String),
    /// Why the description could not be produced
    Error(String),
    /// The request was cancelled before it completed
    Cancelled,
}

impl DetailOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, DetailOutcome::Error(_))
    }
}

/// Result delivered once per detail request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailResult {
    pub request_id: Uuid,
    pub packet_id: u64,
    pub outcome: DetailOutcome,
}

/// Registry view of a detail request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailStatus {
    Pending { request_id: Uuid, packet_id: u64 },
    Ready(DetailResult),
}

/// Asynchronous notifications emitted by the engine and the detail pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionStarted {
        interface: String,
    },
    SessionEnded {
        interface: String,
        stats: SessionStats,
    },
    SessionFailed {
        interface: String,
        error: String,
        stats: SessionStats,
    },
    DetailReady(DetailResult),
}
