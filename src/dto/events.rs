//! Event payloads fanned out to room participants and the operator stream.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::connection::ConnectionQuality;

/// Dispatched payload carried across SSE channels.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

}

/// Initial metadata sent to an SSE client when it connects.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminHandshake {
    /// Token identifying the single privileged stream.
    pub token: String,
}

/// Kind of room event fanned out through the broadcast gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum RoomEventKind {
    /// A participant established their first session.
    #[serde(rename = "connected")]
    Connected,
    /// A participant's transport went away.
    #[serde(rename = "disconnected")]
    Disconnected,
    /// A participant returned and had their state restored.
    #[serde(rename = "reconnected")]
    Reconnected,
    /// A reconciliation sweep completed for the room.
    #[serde(rename = "reconciled")]
    Reconciled,
    /// Operator alert about reconciliation health.
    #[serde(rename = "inconsistency-alert")]
    InconsistencyAlert,
}

impl RoomEventKind {
    /// Stable wire label for the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomEventKind::Connected => "connected",
            RoomEventKind::Disconnected => "disconnected",
            RoomEventKind::Reconnected => "reconnected",
            RoomEventKind::Reconciled => "reconciled",
            RoomEventKind::InconsistencyAlert => "inconsistency-alert",
        }
    }
}

/// One participant as presented in event rosters.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    pub participant_id: Uuid,
    pub display_name: String,
    pub is_live: bool,
    pub is_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Payload attached to every room event.
///
/// Always carries the live roster and live count so consumers never need a
/// follow-up fetch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomEventPayload {
    pub room_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_quality: Option<ConnectionQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub live_participants: Vec<ParticipantSummary>,
    pub live_count: usize,
}
