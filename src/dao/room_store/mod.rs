#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use crate::dao::models::{RoomEntity, VersionedRoom};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for durable room state.
///
/// `write_room` is conditional: the write succeeds only when `expected_revision`
/// still matches the backend's current revision for the row (`None` means the
/// row must not exist yet). A lost precondition surfaces as
/// [`crate::dao::storage::StorageError::Conflict`].
pub trait RoomStore: Send + Sync {
    fn read_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<VersionedRoom>>>;
    fn write_room(
        &self,
        room: RoomEntity,
        expected_revision: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>>;
    fn rooms_for_participant(
        &self,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
