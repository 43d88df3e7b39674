use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::room::{AssignRoleRequest, CreateRoomRequest, JoinRoomRequest, RoomSummary},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes handling room bootstrap operations (creation, joining, inspection).
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/roles", put(assign_role))
}

/// Create a fresh room and persist its initial durable row.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomSummary)
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::create_room(&state, payload).await?;
    Ok(Json(summary))
}

/// Join an existing room, loading it from storage when necessary.
#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Identifier of the room to join")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Room joined", body = RoomSummary)
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::join_room(&state, id, payload).await?;
    Ok(Json(summary))
}

/// Summarize a resident room.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Identifier of the room")),
    responses(
        (status = 200, description = "Room summary", body = RoomSummary)
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::get_room(&state, id).await?;
    Ok(Json(summary))
}

/// Assign or clear a participant's seat in a room.
#[utoipa::path(
    put,
    path = "/rooms/{id}/roles",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Identifier of the room")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = RoomSummary)
    )
)]
pub async fn assign_role(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<AssignRoleRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::assign_role(&state, id, payload).await?;
    Ok(Json(summary))
}
