//! Orchestration of participant connection lifecycle: registration with
//! durable-state restoration, and disconnect handling.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::events::RoomEventKind,
    services::{heartbeat, room_events},
    state::{
        SharedState,
        connection::{DisconnectReason, RegisterKind},
    },
};

/// Outcome of a completed registration, reported back to the participant.
#[derive(Debug)]
pub struct RegistrationResult {
    /// Whether this was a first connection or a return.
    pub kind: RegisterKind,
    /// Whether durable state was copied back into the live rooms.
    pub restored: bool,
    /// Rooms the participant is live in after registration.
    pub rooms: Vec<Uuid>,
}

/// Register a participant's new transport session.
///
/// Durable truth is restored into the live rooms *before* the broadcast and
/// the acknowledgement, because the in-memory state may have decayed or never
/// existed. When the durable lookup fails the connection is still accepted;
/// the ack then reports restoration as skipped and the next reconciliation
/// sweep corrects any drift.
pub async fn handle_register(
    state: &SharedState,
    participant_id: Uuid,
    display_name: String,
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    pong_tx: mpsc::UnboundedSender<u64>,
    pong_rx: mpsc::UnboundedReceiver<u64>,
) -> RegistrationResult {
    let kind = state.registry().register(
        participant_id,
        display_name,
        session_id,
        tx,
        pong_tx,
    );

    let restored = restore_from_durable(state, participant_id).await;

    // Liveness is granted in every resident room regardless of whether the
    // durable lookup succeeded.
    let rooms = mark_live_in_resident_rooms(state, participant_id, true).await;

    heartbeat::start_monitor(state.clone(), participant_id, pong_rx);

    let event = match kind {
        RegisterKind::Connected => RoomEventKind::Connected,
        RegisterKind::Reconnected => RoomEventKind::Reconnected,
    };
    for &room_id in &rooms {
        room_events::broadcast_connection_event(state, room_id, event, participant_id, None).await;
    }

    info!(
        %participant_id,
        %session_id,
        reconnected = matches!(kind, RegisterKind::Reconnected),
        restored,
        "participant registered"
    );

    RegistrationResult {
        kind,
        restored,
        rooms,
    }
}

/// Flip a participant to non-live everywhere and broadcast the drop.
///
/// Idempotent: a second call for an already-disconnected participant is a
/// no-op and broadcasts nothing.
pub async fn handle_disconnect(
    state: &SharedState,
    participant_id: Uuid,
    reason: DisconnectReason,
) {
    if !state.registry().mark_disconnected(participant_id, reason) {
        return;
    }

    heartbeat::stop_monitor(state, participant_id);
    let rooms = mark_live_in_resident_rooms(state, participant_id, false).await;

    for &room_id in &rooms {
        room_events::broadcast_connection_event(
            state,
            room_id,
            RoomEventKind::Disconnected,
            participant_id,
            Some(reason.as_str()),
        )
        .await;
    }

    info!(%participant_id, reason = reason.as_str(), "participant disconnected");
}

/// Copy the participant's durable fields into every matching live room.
/// Returns whether the restoration step fully succeeded.
async fn restore_from_durable(state: &SharedState, participant_id: Uuid) -> bool {
    let Some(store) = state.room_store().await else {
        warn!(%participant_id, "skipping state restoration: storage degraded");
        return false;
    };

    let room_ids = match store.rooms_for_participant(participant_id).await {
        Ok(room_ids) => room_ids,
        Err(err) => {
            warn!(%participant_id, error = %err, "skipping state restoration: lookup failed");
            return false;
        }
    };

    let mut complete = true;
    for room_id in room_ids {
        let Some(handle) = state.room_handle(room_id) else {
            // The room is not resident in this process; nothing to restore.
            continue;
        };

        let occupant = match store.read_room(room_id).await {
            Ok(Some(versioned)) => versioned.room.occupant(participant_id).cloned(),
            Ok(None) => None,
            Err(err) => {
                warn!(%participant_id, %room_id, error = %err, "state restoration read failed");
                complete = false;
                continue;
            }
        };

        if let Some(occupant) = occupant {
            let mut room = handle.write().await;
            if let Some(view) = room.participants.get_mut(&participant_id) {
                view.is_ready = occupant.is_ready;
                view.role = occupant.role.clone();
                view.is_live = true;
            }
        }
    }

    complete
}

/// Set the liveness flag for the participant in every resident room that
/// contains them, returning the affected room ids.
async fn mark_live_in_resident_rooms(
    state: &SharedState,
    participant_id: Uuid,
    is_live: bool,
) -> Vec<Uuid> {
    let mut affected = Vec::new();
    for (room_id, handle) in state.rooms_of_participant(participant_id).await {
        let mut room = handle.write().await;
        if let Some(view) = room.participants.get_mut(&participant_id) {
            view.is_live = is_live;
            affected.push(room_id);
        }
    }
    affected
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{RoomEntity, VersionedRoom},
            room_store::{RoomStore, memory::MemoryRoomStore},
            storage::{StorageError, StorageResult},
        },
        state::{
            AppState,
            room::{LiveRoomState, ParticipantView},
        },
    };

    fn channels() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
        mpsc::UnboundedSender<u64>,
        mpsc::UnboundedReceiver<u64>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        (tx, rx, pong_tx, pong_rx)
    }

    fn stale_resident_room(state: &SharedState, participant_id: Uuid) -> Uuid {
        let mut room = LiveRoomState::new("table".into(), participant_id, "Ada".into());
        // Decayed in-memory view: not ready, no seat, offline.
        room.participants.insert(
            participant_id,
            ParticipantView {
                display_name: "Ada".into(),
                is_live: false,
                is_ready: false,
                role: None,
            },
        );
        let room_id = room.room_id;
        state.insert_room(room);
        room_id
    }

    #[tokio::test]
    async fn reconnection_restores_durable_truth() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRoomStore::new();
        state.install_room_store(Arc::new(store.clone())).await;

        let participant_id = Uuid::new_v4();
        let room_id = stale_resident_room(&state, participant_id);

        // Durable copy says the participant was ready and seated north.
        let handle = state.room_handle(room_id).unwrap();
        let mut entity = handle.read().await.to_entity();
        entity.occupants[0].is_ready = true;
        entity.occupants[0].role = Some("north".into());
        store.write_room(entity, None).await.unwrap();

        let (tx, _rx, pong_tx, pong_rx) = channels();
        let result = handle_register(
            &state,
            participant_id,
            "Ada".into(),
            Uuid::new_v4(),
            tx,
            pong_tx,
            pong_rx,
        )
        .await;

        assert!(result.restored);
        assert_eq!(result.rooms, vec![room_id]);
        let room = handle.read().await;
        let view = &room.participants[&participant_id];
        assert!(view.is_live);
        assert!(view.is_ready);
        assert_eq!(view.role.as_deref(), Some("north"));

        heartbeat::stop_monitor(&state, participant_id);
    }

    /// Store whose participant lookup always fails.
    #[derive(Clone)]
    struct BrokenLookupStore;

    impl RoomStore for BrokenLookupStore {
        fn read_room(
            &self,
            _id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<VersionedRoom>>> {
            Box::pin(async { Ok(None) })
        }

        fn write_room(
            &self,
            _room: RoomEntity,
            _expected_revision: Option<String>,
        ) -> BoxFuture<'static, StorageResult<String>> {
            Box::pin(async { Ok("1".into()) })
        }

        fn rooms_for_participant(
            &self,
            _participant_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
            Box::pin(async {
                Err(StorageError::unavailable(
                    "lookup refused".into(),
                    std::io::Error::other("down"),
                ))
            })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn failed_restoration_still_accepts_the_connection() {
        let state = AppState::new(AppConfig::default());
        state.install_room_store(Arc::new(BrokenLookupStore)).await;

        let participant_id = Uuid::new_v4();
        let room_id = stale_resident_room(&state, participant_id);

        let (tx, _rx, pong_tx, pong_rx) = channels();
        let result = handle_register(
            &state,
            participant_id,
            "Ada".into(),
            Uuid::new_v4(),
            tx,
            pong_tx,
            pong_rx,
        )
        .await;

        // Availability over strict consistency: live, but not restored.
        assert!(!result.restored);
        assert!(state.registry().is_live(participant_id));
        let handle = state.room_handle(room_id).unwrap();
        assert!(handle.read().await.participants[&participant_id].is_live);

        heartbeat::stop_monitor(&state, participant_id);
    }

    #[tokio::test]
    async fn double_disconnect_changes_nothing() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRoomStore::new();
        state.install_room_store(Arc::new(store)).await;

        let participant_id = Uuid::new_v4();
        let room_id = stale_resident_room(&state, participant_id);

        let (tx, _rx, pong_tx, pong_rx) = channels();
        handle_register(
            &state,
            participant_id,
            "Ada".into(),
            Uuid::new_v4(),
            tx,
            pong_tx,
            pong_rx,
        )
        .await;

        handle_disconnect(&state, participant_id, DisconnectReason::TransportClosed).await;
        let handle = state.room_handle(room_id).unwrap();
        let snapshot = handle.read().await.participants[&participant_id].clone();

        handle_disconnect(&state, participant_id, DisconnectReason::TransportClosed).await;
        assert_eq!(
            handle.read().await.participants[&participant_id],
            snapshot
        );
        assert!(!state.registry().is_live(participant_id));
    }
}
