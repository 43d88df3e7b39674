//! Comparison and correction between live room state and the durable copy.
//!
//! The durable store is the system of record for recoverable fields; the live
//! store is corrected to match it. Writes back to the durable store are
//! conditional on the revision read at the start of the sweep, so a sweep that
//! races a concurrent writer loses cleanly and is retried on the next tick.

use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{OccupantEntity, RoomEntity},
    error::ServiceError,
    services::room_events,
    state::{SharedState, room::LiveRoomState},
};

/// Classifies one detected divergence between live and durable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Readiness flag differs between stores.
    ReadyMismatch,
    /// Role assignment differs between stores.
    RoleMismatch,
    /// Occupant exists in the durable row but not in live state.
    ParticipantMissingInLive,
    /// Participant exists in live state but not in the durable row.
    ParticipantMissingInDurable,
    /// Host identity differs between stores.
    OwnerMismatch,
    /// The room has no durable row at all.
    RoomMissingInDurable,
}

/// A value-only record describing one detected divergence.
///
/// Produced transiently during a sweep; never persisted beyond the
/// statistics aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Inconsistency {
    pub kind: InconsistencyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_value: Option<String>,
}

impl Inconsistency {
    fn new(kind: InconsistencyKind) -> Self {
        Self {
            kind,
            participant_id: None,
            live_value: None,
            durable_value: None,
        }
    }

    fn for_participant(kind: InconsistencyKind, participant_id: Uuid) -> Self {
        Self {
            participant_id: Some(participant_id),
            ..Self::new(kind)
        }
    }
}

/// Result of one reconciliation pass over a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The room is not resident in this process; nothing to do.
    Inactive,
    /// The sweep completed and the room version was bumped.
    Completed {
        version: u64,
        inconsistencies: Vec<Inconsistency>,
    },
}

/// Compare live and durable state field by field.
///
/// Pure function with no side effects, usable independently for diagnostics.
pub fn detect_inconsistencies(live: &LiveRoomState, durable: &RoomEntity) -> Vec<Inconsistency> {
    let mut report = Vec::new();

    if live.host_id != durable.host_id {
        report.push(Inconsistency {
            live_value: Some(live.host_id.to_string()),
            durable_value: Some(durable.host_id.to_string()),
            ..Inconsistency::new(InconsistencyKind::OwnerMismatch)
        });
    }

    for occupant in &durable.occupants {
        match live.participants.get(&occupant.participant_id) {
            Some(view) => {
                if view.is_ready != occupant.is_ready {
                    report.push(Inconsistency {
                        live_value: Some(view.is_ready.to_string()),
                        durable_value: Some(occupant.is_ready.to_string()),
                        ..Inconsistency::for_participant(
                            InconsistencyKind::ReadyMismatch,
                            occupant.participant_id,
                        )
                    });
                }
                if view.role != occupant.role {
                    report.push(Inconsistency {
                        live_value: view.role.clone(),
                        durable_value: occupant.role.clone(),
                        ..Inconsistency::for_participant(
                            InconsistencyKind::RoleMismatch,
                            occupant.participant_id,
                        )
                    });
                }
            }
            None => {
                report.push(Inconsistency {
                    durable_value: Some(occupant.display_name.clone()),
                    ..Inconsistency::for_participant(
                        InconsistencyKind::ParticipantMissingInLive,
                        occupant.participant_id,
                    )
                });
            }
        }
    }

    for (&participant_id, view) in &live.participants {
        if durable.occupant(participant_id).is_none() {
            report.push(Inconsistency {
                live_value: Some(view.display_name.clone()),
                ..Inconsistency::for_participant(
                    InconsistencyKind::ParticipantMissingInDurable,
                    participant_id,
                )
            });
        }
    }

    report
}

/// Bring one room's live and durable state into agreement.
///
/// Resolution is deterministic: durable wins for fields present in both
/// stores; participants only known to the live store are flagged and adopted
/// into the durable row; occupants only known to the durable store are
/// treated as disconnected ghosts and are not resurrected into live state.
///
/// A lost conditional write surfaces as [`ServiceError::Conflict`]; the
/// caller defers to the next scheduled tick rather than retrying here.
pub async fn reconcile_room(
    state: &SharedState,
    room_id: Uuid,
) -> Result<ReconcileOutcome, ServiceError> {
    let Some(handle) = state.room_handle(room_id) else {
        debug!(%room_id, "room not resident; skipping reconciliation");
        return Ok(ReconcileOutcome::Inactive);
    };

    let store = state.require_room_store().await?;

    let Some(versioned) = store.read_room(room_id).await? else {
        // No durable row yet: seed it from the live snapshot. The conditional
        // create still arbitrates against a concurrent first writer.
        let (entity, inconsistency) = {
            let room = handle.read().await;
            let inconsistency = Inconsistency {
                live_value: Some(room.name.clone()),
                ..Inconsistency::new(InconsistencyKind::RoomMissingInDurable)
            };
            (room.to_entity(), inconsistency)
        };
        store.write_room(entity, None).await?;

        let version = bump_version(&handle).await;
        let inconsistencies = vec![inconsistency];
        room_events::broadcast_reconciled(state, room_id, version).await;
        return Ok(ReconcileOutcome::Completed {
            version,
            inconsistencies,
        });
    };

    let durable = versioned.room;
    let revision = versioned.revision;

    let (inconsistencies, merged) = {
        let mut room = handle.write().await;
        let inconsistencies = detect_inconsistencies(&room, &durable);

        // Durable wins for every field present in both stores.
        room.host_id = durable.host_id;
        room.status = durable.status.into();
        for occupant in &durable.occupants {
            if let Some(view) = room.participants.get_mut(&occupant.participant_id) {
                view.is_ready = occupant.is_ready;
                view.role = occupant.role.clone();
            }
        }

        (inconsistencies, merged_entity(&room, &durable))
    };

    if let Err(err) = store.write_room(merged, Some(revision)).await {
        if err.is_conflict() {
            warn!(%room_id, "reconciliation lost to a concurrent writer; deferring to next tick");
        }
        return Err(err.into());
    }

    let version = bump_version(&handle).await;
    debug!(%room_id, version, findings = inconsistencies.len(), "room reconciled");
    room_events::broadcast_reconciled(state, room_id, version).await;

    Ok(ReconcileOutcome::Completed {
        version,
        inconsistencies,
    })
}

/// Increment the room version; called exactly once per successful
/// conditional write.
async fn bump_version(handle: &crate::state::RoomHandle) -> u64 {
    let mut room = handle.write().await;
    room.version += 1;
    room.version
}

/// Build the durable row persisted at the end of a sweep: the durable
/// occupants as-is (ghosts included), plus live-only participants adopted
/// with their current live values.
fn merged_entity(live: &LiveRoomState, durable: &RoomEntity) -> RoomEntity {
    let mut occupants = durable.occupants.clone();
    for (&participant_id, view) in &live.participants {
        if durable.occupant(participant_id).is_none() {
            occupants.push(OccupantEntity {
                participant_id,
                display_name: view.display_name.clone(),
                is_ready: view.is_ready,
                role: view.role.clone(),
            });
        }
    }

    RoomEntity {
        id: durable.id,
        name: durable.name.clone(),
        host_id: durable.host_id,
        status: durable.status,
        occupants,
        created_at: durable.created_at,
        updated_at: std::time::SystemTime::now(),
    }
}
