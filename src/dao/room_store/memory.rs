//! In-memory [`RoomStore`] used for local development and tests.
//!
//! Revisions are a per-room write counter rendered as a string, so the
//! conditional-write semantics match the CouchDB backend: a write succeeds
//! only when the caller presents the revision it last read.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{RoomEntity, VersionedRoom},
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// Durable room rows kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<Uuid, StoredRoom>>,
}

#[derive(Clone)]
struct StoredRoom {
    room: RoomEntity,
    revision: u64,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn render_revision(counter: u64) -> String {
        counter.to_string()
    }
}

impl RoomStore for MemoryRoomStore {
    fn read_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<VersionedRoom>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.rooms.get(&id).map(|entry| VersionedRoom {
                room: entry.room.clone(),
                revision: Self::render_revision(entry.revision),
            }))
        })
    }

    fn write_room(
        &self,
        room: RoomEntity,
        expected_revision: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            match store.rooms.entry(room_id) {
                Entry::Occupied(mut entry) => {
                    let current = Self::render_revision(entry.get().revision);
                    if expected_revision.as_deref() != Some(current.as_str()) {
                        return Err(StorageError::Conflict { room_id });
                    }
                    let next = entry.get().revision + 1;
                    entry.insert(StoredRoom {
                        room,
                        revision: next,
                    });
                    Ok(Self::render_revision(next))
                }
                Entry::Vacant(slot) => {
                    if expected_revision.is_some() {
                        return Err(StorageError::Conflict { room_id });
                    }
                    slot.insert(StoredRoom { room, revision: 1 });
                    Ok(Self::render_revision(1))
                }
            }
        })
    }

    fn rooms_for_participant(
        &self,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .rooms
                .iter()
                .filter(|entry| entry.room.occupant(participant_id).is_some())
                .map(|entry| *entry.key())
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{OccupantEntity, RoomStatusEntity};

    fn sample_room(id: Uuid, participant: Uuid) -> RoomEntity {
        let now = SystemTime::now();
        RoomEntity {
            id,
            name: "table one".into(),
            host_id: participant,
            status: RoomStatusEntity::Open,
            occupants: vec![OccupantEntity {
                participant_id: participant,
                display_name: "Ada".into(),
                is_ready: false,
                role: None,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_read_round_trips_revision() {
        let store = MemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        let room = sample_room(room_id, Uuid::new_v4());

        let rev = store.write_room(room.clone(), None).await.unwrap();
        let loaded = store.read_room(room_id).await.unwrap().unwrap();
        assert_eq!(loaded.revision, rev);
        assert_eq!(loaded.room, room);
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        let room = sample_room(room_id, Uuid::new_v4());

        let first = store.write_room(room.clone(), None).await.unwrap();
        store
            .write_room(room.clone(), Some(first.clone()))
            .await
            .unwrap();

        // Writing again with the original revision must lose.
        let err = store.write_room(room, Some(first)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn create_conflicts_when_row_exists() {
        let store = MemoryRoomStore::new();
        let room_id = Uuid::new_v4();
        let room = sample_room(room_id, Uuid::new_v4());

        store.write_room(room.clone(), None).await.unwrap();
        let err = store.write_room(room, None).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn rooms_for_participant_filters_by_occupancy() {
        let store = MemoryRoomStore::new();
        let member = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        store
            .write_room(sample_room(room_id, member), None)
            .await
            .unwrap();
        store
            .write_room(sample_room(Uuid::new_v4(), Uuid::new_v4()), None)
            .await
            .unwrap();

        let rooms = store.rooms_for_participant(member).await.unwrap();
        assert_eq!(rooms, vec![room_id]);
    }
}
