//! Serializable views of a call session.

use crate::{CallEventKind, CallState, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a session's append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// When the event was received (or, for provider events carrying their
    /// own timestamp, when the provider says it happened).
    pub at: DateTime<Utc>,
    pub kind: CallEventKind,
}

/// Point-in-time copy of a call session.
///
/// Returned by status queries; holding one never keeps the live session
/// alive or lets the holder mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub direction: Direction,
    pub state: CallState,
    /// The far-end phone number.
    pub counterpart: String,
    /// Provider call-leg id, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,
    pub socket_open: bool,
    pub pipeline_in_flight: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_log: Vec<EventLogEntry>,
}
