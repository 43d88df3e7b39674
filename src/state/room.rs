use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{OccupantEntity, RoomEntity, RoomStatusEntity};

/// Lifecycle status of a live room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// The room accepts new participants.
    Open,
    /// A game is in progress at the table.
    InGame,
    /// The room has been shut down.
    Closed,
}

/// In-memory view of one participant inside a room.
///
/// `is_live` mirrors the connection registry; `is_ready` and `role` are the
/// recoverable fields the durable store owns between sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    /// Display name chosen for the participant.
    pub display_name: String,
    /// Whether the participant currently has a live transport session.
    pub is_live: bool,
    /// Whether the participant declared themselves ready.
    pub is_ready: bool,
    /// Seat or role assigned to the participant, if any.
    pub role: Option<String>,
}

/// The authoritative in-process copy of a room consulted by all live traffic.
#[derive(Debug, Clone)]
pub struct LiveRoomState {
    /// Primary key of the room.
    pub room_id: Uuid,
    /// Display name of the table.
    pub name: String,
    /// Reconciliation version; bumped exactly once per successful sweep.
    pub version: u64,
    /// Participant currently hosting the room.
    pub host_id: Uuid,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Participants keyed by identifier, in join order.
    pub participants: IndexMap<Uuid, ParticipantView>,
    /// Creation timestamp carried through to persistence.
    pub created_at: SystemTime,
}

impl LiveRoomState {
    /// Build a fresh room hosted by `host_id` with the host as first occupant.
    pub fn new(name: String, host_id: Uuid, host_name: String) -> Self {
        let mut participants = IndexMap::new();
        participants.insert(
            host_id,
            ParticipantView {
                display_name: host_name,
                is_live: false,
                is_ready: false,
                role: None,
            },
        );

        Self {
            room_id: Uuid::new_v4(),
            name,
            version: 0,
            host_id,
            status: RoomStatus::Open,
            participants,
            created_at: SystemTime::now(),
        }
    }

    /// Whether at least one participant has a live connection.
    pub fn has_live_participant(&self) -> bool {
        self.participants.values().any(|view| view.is_live)
    }

    /// Number of participants with a live connection.
    pub fn live_count(&self) -> usize {
        self.participants.values().filter(|view| view.is_live).count()
    }

    /// Produce the durable representation of the current live state.
    pub fn to_entity(&self) -> RoomEntity {
        RoomEntity {
            id: self.room_id,
            name: self.name.clone(),
            host_id: self.host_id,
            status: self.status.into(),
            occupants: self
                .participants
                .iter()
                .map(|(&participant_id, view)| OccupantEntity {
                    participant_id,
                    display_name: view.display_name.clone(),
                    is_ready: view.is_ready,
                    role: view.role.clone(),
                })
                .collect(),
            created_at: self.created_at,
            updated_at: SystemTime::now(),
        }
    }

    /// Rebuild a live room from its durable representation.
    ///
    /// Every occupant starts non-live; liveness is only ever granted by the
    /// connection registry.
    pub fn from_entity(entity: &RoomEntity) -> Self {
        Self {
            room_id: entity.id,
            name: entity.name.clone(),
            version: 0,
            host_id: entity.host_id,
            status: entity.status.into(),
            participants: entity
                .occupants
                .iter()
                .map(|occupant| {
                    (
                        occupant.participant_id,
                        ParticipantView {
                            display_name: occupant.display_name.clone(),
                            is_live: false,
                            is_ready: occupant.is_ready,
                            role: occupant.role.clone(),
                        },
                    )
                })
                .collect(),
            created_at: entity.created_at,
        }
    }
}

impl From<RoomStatus> for RoomStatusEntity {
    fn from(value: RoomStatus) -> Self {
        match value {
            RoomStatus::Open => RoomStatusEntity::Open,
            RoomStatus::InGame => RoomStatusEntity::InGame,
            RoomStatus::Closed => RoomStatusEntity::Closed,
        }
    }
}

impl From<RoomStatusEntity> for RoomStatus {
    fn from(value: RoomStatusEntity) -> Self {
        match value {
            RoomStatusEntity::Open => RoomStatus::Open,
            RoomStatusEntity::InGame => RoomStatus::InGame,
            RoomStatusEntity::Closed => RoomStatus::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with_liveness(flags: &[bool]) -> LiveRoomState {
        let host = Uuid::new_v4();
        let mut room = LiveRoomState::new("table".into(), host, "host".into());
        room.participants.clear();
        for (index, &live) in flags.iter().enumerate() {
            room.participants.insert(
                Uuid::new_v4(),
                ParticipantView {
                    display_name: format!("p{index}"),
                    is_live: live,
                    is_ready: false,
                    role: None,
                },
            );
        }
        room
    }

    #[test]
    fn one_live_participant_makes_the_room_active() {
        let room = room_with_liveness(&[true, false]);
        assert!(room.has_live_participant());
        assert_eq!(room.live_count(), 1);
    }

    #[test]
    fn all_disconnected_room_is_inactive() {
        let room = room_with_liveness(&[false, false]);
        assert!(!room.has_live_participant());
    }

    #[test]
    fn entity_round_trip_preserves_recoverable_fields() {
        let host = Uuid::new_v4();
        let mut room = LiveRoomState::new("table".into(), host, "host".into());
        {
            let view = room.participants.get_mut(&host).unwrap();
            view.is_ready = true;
            view.role = Some("dealer".into());
            view.is_live = true;
        }

        let rebuilt = LiveRoomState::from_entity(&room.to_entity());
        let view = &rebuilt.participants[&host];
        assert!(view.is_ready);
        assert_eq!(view.role.as_deref(), Some("dealer"));
        // Liveness never round-trips through persistence.
        assert!(!view.is_live);
    }
}
