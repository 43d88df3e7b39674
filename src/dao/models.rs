use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Durable representation of a room, the system of record for recoverability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Stable identifier for the room.
    pub id: Uuid,
    /// Human readable room name.
    pub name: String,
    /// Participant currently hosting the room.
    pub host_id: Uuid,
    /// Lifecycle status of the room.
    pub status: RoomStatusEntity,
    /// Occupants of the room with their recoverable state.
    pub occupants: Vec<OccupantEntity>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the room document was updated.
    pub updated_at: SystemTime,
}

impl RoomEntity {
    /// Find an occupant by participant identifier.
    pub fn occupant(&self, participant_id: Uuid) -> Option<&OccupantEntity> {
        self.occupants
            .iter()
            .find(|occupant| occupant.participant_id == participant_id)
    }
}

/// Recoverable per-participant state stored alongside the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OccupantEntity {
    /// Stable identifier for the participant.
    pub participant_id: Uuid,
    /// Display name chosen for the participant.
    pub display_name: String,
    /// Whether the participant declared themselves ready.
    pub is_ready: bool,
    /// Seat or role assigned to the participant, if any.
    pub role: Option<String>,
}

/// Lifecycle status of a room as persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatusEntity {
    /// The room accepts new participants.
    Open,
    /// A game is in progress at the table.
    InGame,
    /// The room has been shut down.
    Closed,
}

/// A durable room together with the backend revision it was read at.
///
/// The revision is opaque to callers; it is only ever handed back to
/// [`crate::dao::room_store::RoomStore::write_room`] as the write precondition.
#[derive(Debug, Clone)]
pub struct VersionedRoom {
    /// The room document.
    pub room: RoomEntity,
    /// Backend revision current at read time.
    pub revision: String,
}
