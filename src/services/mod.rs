/// Connection lifecycle orchestration and durable-state restoration.
pub mod connection_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-participant liveness probing.
pub mod heartbeat;
/// Live/durable state comparison and correction.
pub mod reconciliation;
/// Event fan-out to room participants and operators.
pub mod room_events;
/// Room bootstrap and live-traffic mutations.
pub mod room_service;
/// Periodic reconciliation, cleanup, and monitoring sweeps.
pub mod scheduler;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Reconciliation statistics and alert evaluation.
pub mod stats;
/// Storage connection supervision with degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
