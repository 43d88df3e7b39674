//! DTOs for the room bootstrap REST surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{events::ParticipantSummary, format_system_time},
    state::room::{LiveRoomState, RoomStatus},
};

/// Payload to create a fresh room hosted by the caller.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoomRequest {
    /// Display name of the table.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Participant identifier of the host.
    pub host_id: Uuid,
    /// Display name of the host.
    #[validate(length(min = 1, max = 64))]
    pub host_name: String,
}

/// Payload to join an existing room.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JoinRoomRequest {
    /// Participant identifier of the joiner.
    pub participant_id: Uuid,
    /// Display name of the joiner.
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
}

/// Payload to assign a seat or role to a participant.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRoleRequest {
    /// Participant whose role changes.
    pub participant_id: Uuid,
    /// New role label, or `null` to clear the assignment.
    #[validate(length(min = 1, max = 32))]
    pub role: Option<String>,
}

/// Projection of a room returned by the REST surface.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSummary {
    pub room_id: Uuid,
    pub name: String,
    pub host_id: Uuid,
    pub status: String,
    pub version: u64,
    pub participants: Vec<ParticipantSummary>,
    pub live_count: usize,
    pub created_at: String,
}

impl From<&LiveRoomState> for RoomSummary {
    fn from(room: &LiveRoomState) -> Self {
        let status = match room.status {
            RoomStatus::Open => "open",
            RoomStatus::InGame => "in_game",
            RoomStatus::Closed => "closed",
        };

        Self {
            room_id: room.room_id,
            name: room.name.clone(),
            host_id: room.host_id,
            status: status.to_string(),
            version: room.version,
            participants: room
                .participants
                .iter()
                .map(|(&participant_id, view)| ParticipantSummary {
                    participant_id,
                    display_name: view.display_name.clone(),
                    is_live: view.is_live,
                    is_ready: view.is_ready,
                    role: view.role.clone(),
                })
                .collect(),
            live_count: room.live_count(),
            created_at: format_system_time(room.created_at),
        }
    }
}
