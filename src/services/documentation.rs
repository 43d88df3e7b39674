use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Card Table Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::admin_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::rooms::create_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::assign_role,
        crate::routes::reconciliation::status,
        crate::routes::reconciliation::update_config,
        crate::routes::reconciliation::reset_stats,
        crate::routes::reconciliation::force_reconcile,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ParticipantInboundMessage,
            crate::dto::ws::ParticipantOutboundMessage,
            crate::dto::events::AdminHandshake,
            crate::dto::events::RoomEventPayload,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::AssignRoleRequest,
            crate::dto::room::RoomSummary,
            crate::dto::admin::ReconciliationStatusResponse,
            crate::dto::admin::UpdateSyncConfigRequest,
            crate::dto::admin::ForceReconcileResponse,
            crate::dto::admin::StatsSnapshot,
            crate::dto::admin::Alert,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "participants", description = "WebSocket operations for room participants"),
        (name = "rooms", description = "Room bootstrap operations"),
        (name = "reconciliation", description = "Operator surface for the reconciliation scheduler"),
    )
)]
pub struct ApiDoc;
