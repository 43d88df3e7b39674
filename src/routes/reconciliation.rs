//! Operator surface for the reconciliation scheduler.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::admin::{
        ForceReconcileResponse, ReconciliationStatusResponse, StatsSnapshot,
        UpdateSyncConfigRequest,
    },
    error::AppError,
    services::reconciliation::{self, ReconcileOutcome},
    state::SharedState,
};

/// Routes exposing reconciliation status, configuration, and manual sweeps.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/reconciliation/status", get(status))
        .route("/reconciliation/config", put(update_config))
        .route("/reconciliation/reset-stats", post(reset_stats))
        .route("/reconciliation/force/{room_id}", post(force_reconcile))
}

fn status_response(state: &SharedState, is_running: bool) -> ReconciliationStatusResponse {
    let config = state.scheduler().sync_config();
    ReconciliationStatusResponse {
        is_running,
        intervals: config.into(),
        thresholds: config.thresholds.into(),
        stats: state.scheduler().stats().snapshot(),
    }
}

/// Report scheduler state, intervals, thresholds, and accumulated statistics.
#[utoipa::path(
    get,
    path = "/reconciliation/status",
    tag = "reconciliation",
    responses(
        (status = 200, description = "Scheduler status", body = ReconciliationStatusResponse)
    )
)]
pub async fn status(State(state): State<SharedState>) -> Json<ReconciliationStatusResponse> {
    let is_running = state.scheduler().is_running().await;
    Json(status_response(&state, is_running))
}

/// Apply a partial configuration update; a running scheduler is restarted so
/// the new intervals take effect immediately.
#[utoipa::path(
    put,
    path = "/reconciliation/config",
    tag = "reconciliation",
    request_body = UpdateSyncConfigRequest,
    responses(
        (status = 200, description = "Configuration applied", body = ReconciliationStatusResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<UpdateSyncConfigRequest>>,
) -> Result<Json<ReconciliationStatusResponse>, AppError> {
    let merged = payload.merged_into(state.scheduler().sync_config());
    state.scheduler().update_config(&state, merged).await;
    let is_running = state.scheduler().is_running().await;
    Ok(Json(status_response(&state, is_running)))
}

/// Zero the accumulated reconciliation statistics.
#[utoipa::path(
    post,
    path = "/reconciliation/reset-stats",
    tag = "reconciliation",
    responses(
        (status = 200, description = "Statistics reset", body = StatsSnapshot)
    )
)]
pub async fn reset_stats(State(state): State<SharedState>) -> Json<StatsSnapshot> {
    state.scheduler().stats().reset();
    Json(state.scheduler().stats().snapshot())
}

/// Run one reconciliation sweep for a room synchronously and return its result.
#[utoipa::path(
    post,
    path = "/reconciliation/force/{room_id}",
    tag = "reconciliation",
    params(("room_id" = Uuid, Path, description = "Room to reconcile")),
    responses(
        (status = 200, description = "Sweep result", body = ForceReconcileResponse),
        (status = 409, description = "A concurrent writer won the durable write")
    )
)]
pub async fn force_reconcile(
    State(state): State<SharedState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<ForceReconcileResponse>, AppError> {
    let outcome = reconciliation::reconcile_room(&state, room_id).await?;
    let response = match outcome {
        ReconcileOutcome::Inactive => ForceReconcileResponse {
            room_id,
            active: false,
            version: None,
            inconsistencies: Vec::new(),
        },
        ReconcileOutcome::Completed {
            version,
            inconsistencies,
        } => ForceReconcileResponse {
            room_id,
            active: true,
            version: Some(version),
            inconsistencies,
        },
    };
    Ok(Json(response))
}
