pub mod connection;
pub mod room;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    services::scheduler::ReconciliationScheduler,
    state::{connection::ConnectionRegistry, room::LiveRoomState},
};

pub use self::sse::SseHub;
use self::sse::SseState;

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Guarded handle to one room's live state; all mutations of a room go
/// through this lock so live traffic and reconciliation serialize per room.
pub type RoomHandle = Arc<RwLock<LiveRoomState>>;

/// Central application state storing live rooms, connections, and the
/// durable store handle.
pub struct AppState {
    config: AppConfig,
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    rooms: DashMap<Uuid, RoomHandle>,
    registry: ConnectionRegistry,
    scheduler: ReconciliationScheduler,
    sse: SseState,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let scheduler = ReconciliationScheduler::new(config.sync);
        Arc::new(Self {
            config,
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: DashMap::new(),
            registry: ConnectionRegistry::new(),
            scheduler,
            sse: SseState::new(16),
        })
    }

    /// Immutable process-wide configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the room store or fail with a degraded-mode error.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.room_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of participant transport sessions.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The reconciliation scheduler bundle (tasks, stats, runtime config).
    pub fn scheduler(&self) -> &ReconciliationScheduler {
        &self.scheduler
    }

    /// Broadcast hub used for the operator SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin().hub()
    }

    /// Token guard that ensures a single admin SSE subscriber at a time.
    pub fn admin_token(&self) -> &Mutex<Option<String>> {
        self.sse.admin().token()
    }

    /// Guarded handle to a room's live state, if the room is resident.
    pub fn room_handle(&self, room_id: Uuid) -> Option<RoomHandle> {
        self.rooms.get(&room_id).map(|entry| entry.value().clone())
    }

    /// Make a room resident in the live store.
    pub fn insert_room(&self, room: LiveRoomState) -> RoomHandle {
        let room_id = room.room_id;
        let handle: RoomHandle = Arc::new(RwLock::new(room));
        self.rooms.insert(room_id, handle.clone());
        handle
    }

    /// Evict a room from the live store.
    pub fn remove_room(&self, room_id: Uuid) -> Option<RoomHandle> {
        self.rooms.remove(&room_id).map(|(_, handle)| handle)
    }

    /// Identifiers of every resident room.
    pub fn resident_rooms(&self) -> Vec<Uuid> {
        self.rooms.iter().map(|entry| *entry.key()).collect()
    }

    /// Rooms that currently have at least one live connection; the set the
    /// reconciliation sweep operates on.
    pub async fn active_rooms(&self) -> Vec<Uuid> {
        let handles: Vec<(Uuid, RoomHandle)> = self
            .rooms
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut active = Vec::new();
        for (room_id, handle) in handles {
            if handle.read().await.has_live_participant() {
                active.push(room_id);
            }
        }
        active
    }

    /// Resident rooms that contain the given participant.
    pub async fn rooms_of_participant(&self, participant_id: Uuid) -> Vec<(Uuid, RoomHandle)> {
        let handles: Vec<(Uuid, RoomHandle)> = self
            .rooms
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut rooms = Vec::new();
        for (room_id, handle) in handles {
            if handle
                .read()
                .await
                .participants
                .contains_key(&participant_id)
            {
                rooms.push((room_id, handle));
            }
        }
        rooms
    }

    /// Update and broadcast the degraded flag when the value changes.
    async fn update_degraded(&self, value: bool) {
        if self.is_degraded().await == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::room::ParticipantView;

    fn insert_room_with_liveness(state: &SharedState, flags: &[bool]) -> Uuid {
        let host = Uuid::new_v4();
        let mut room = LiveRoomState::new("table".into(), host, "host".into());
        room.participants.clear();
        for &live in flags {
            room.participants.insert(
                Uuid::new_v4(),
                ParticipantView {
                    display_name: "p".into(),
                    is_live: live,
                    is_ready: false,
                    role: None,
                },
            );
        }
        let room_id = room.room_id;
        state.insert_room(room);
        room_id
    }

    #[tokio::test]
    async fn active_rooms_requires_one_live_connection() {
        let state = AppState::new(AppConfig::default());
        let active = insert_room_with_liveness(&state, &[true, false]);
        let idle = insert_room_with_liveness(&state, &[false, false]);

        let rooms = state.active_rooms().await;
        assert!(rooms.contains(&active));
        assert!(!rooms.contains(&idle));
    }

    #[tokio::test]
    async fn store_install_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);

        let store = Arc::new(crate::dao::room_store::memory::MemoryRoomStore::new());
        state.install_room_store(store).await;
        assert!(!state.is_degraded().await);

        state.clear_room_store().await;
        assert!(state.is_degraded().await);
    }
}
