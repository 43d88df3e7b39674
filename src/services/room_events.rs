//! Fan-out of connection and reconciliation events to room participants and
//! the operator stream.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        admin::Alert,
        events::{ParticipantSummary, RoomEventKind, RoomEventPayload, ServerEvent},
    },
    services::websocket_service::send_message_to_websocket,
    state::{SharedState, room::LiveRoomState},
};

/// SSE event name used for operator alerts.
const EVENT_INCONSISTENCY_ALERT: &str = "inconsistency-alert";

/// Envelope framing a room event on the participant WebSocket.
#[derive(Debug, Serialize)]
struct RoomEventMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    payload: &'a RoomEventPayload,
}

/// Live-participant roster included in every event payload so consumers
/// never need a follow-up fetch.
pub fn live_roster(room: &LiveRoomState) -> Vec<ParticipantSummary> {
    room.participants
        .iter()
        .filter(|(_, view)| view.is_live)
        .map(|(&participant_id, view)| ParticipantSummary {
            participant_id,
            display_name: view.display_name.clone(),
            is_live: view.is_live,
            is_ready: view.is_ready,
            role: view.role.clone(),
        })
        .collect()
}

/// Broadcast a connection lifecycle event for one participant of a room.
pub async fn broadcast_connection_event(
    state: &SharedState,
    room_id: Uuid,
    kind: RoomEventKind,
    participant_id: Uuid,
    reason: Option<&str>,
) {
    let Some(handle) = state.room_handle(room_id) else {
        return;
    };

    let payload = {
        let room = handle.read().await;
        let record = state.registry().record(participant_id);
        let roster = live_roster(&room);
        RoomEventPayload {
            room_id,
            participant_id: Some(participant_id),
            is_live: Some(state.registry().is_live(participant_id)),
            connection_quality: record.as_ref().map(|r| r.quality),
            latency_ms: record.as_ref().and_then(|r| r.latency_ms),
            reason: reason.map(str::to_string),
            version: None,
            live_count: roster.len(),
            live_participants: roster,
        }
    };

    notify(state, &payload, kind).await;
}

/// Broadcast the completion of a reconciliation sweep for a room.
pub async fn broadcast_reconciled(state: &SharedState, room_id: Uuid, version: u64) {
    let Some(handle) = state.room_handle(room_id) else {
        return;
    };

    let payload = {
        let room = handle.read().await;
        let roster = live_roster(&room);
        RoomEventPayload {
            room_id,
            participant_id: None,
            is_live: None,
            connection_quality: None,
            latency_ms: None,
            reason: None,
            version: Some(version),
            live_count: roster.len(),
            live_participants: roster,
        }
    };

    notify(state, &payload, RoomEventKind::Reconciled).await;
}

/// Fan one event out to every live session of the affected room.
///
/// Delivery is best-effort and at-most-once per live session; nothing is
/// queued or retried for sessions that are not currently live.
async fn notify(state: &SharedState, payload: &RoomEventPayload, kind: RoomEventKind) {
    let Some(handle) = state.room_handle(payload.room_id) else {
        return;
    };

    let recipients: Vec<Uuid> = {
        let room = handle.read().await;
        room.participants
            .iter()
            .filter(|(_, view)| view.is_live)
            .map(|(&participant_id, _)| participant_id)
            .collect()
    };

    let message = RoomEventMessage {
        kind: kind.as_str(),
        payload,
    };

    for participant_id in recipients {
        let Some(tx) = state.registry().live_sender(participant_id) else {
            continue;
        };
        if send_message_to_websocket(&tx, &message).is_err() {
            debug!(
                %participant_id,
                room_id = %payload.room_id,
                event = kind.as_str(),
                "skipping event for closed session"
            );
        }
    }
}

/// Push threshold alerts onto the operator SSE stream.
pub fn broadcast_alerts(state: &SharedState, alerts: &[Alert]) {
    for alert in alerts {
        match ServerEvent::json(Some(EVENT_INCONSISTENCY_ALERT.to_string()), alert) {
            Ok(event) => state.admin_sse().broadcast(event),
            Err(err) => {
                warn!(error = %err, "failed to serialize operator alert")
            }
        }
    }
}
