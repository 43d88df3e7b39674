//! DTO definitions used by the operator REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{AlertThresholds, SyncConfig},
    services::reconciliation::Inconsistency,
};

/// Monotonic counters accumulated across sweeps, with rates derived at
/// snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StatsSnapshot {
    pub total_sweeps: u64,
    pub successful_sweeps: u64,
    pub failed_sweeps: u64,
    pub inconsistencies_found: u64,
    pub sweeps_with_inconsistencies: u64,
    pub stale_connections_cleaned: u64,
    /// `successful_sweeps / total_sweeps`, 0 when no sweep ran yet.
    pub success_rate: f64,
    /// `failed_sweeps / total_sweeps`, 0 when no sweep ran yet.
    pub failure_rate: f64,
    /// Share of sweeps that found at least one inconsistency.
    pub inconsistency_rate: f64,
    /// Mean number of inconsistencies per sweep.
    pub avg_inconsistencies_per_sweep: f64,
}

/// Alert raised by the monitoring tick when a threshold is crossed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Alert {
    /// Which threshold was crossed.
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Human-readable description for operators.
    pub message: String,
    /// Observed value that crossed the threshold.
    pub value: f64,
    /// Configured threshold.
    pub threshold: f64,
}

/// Classifies operator alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum AlertKind {
    /// Failure rate above the configured maximum.
    #[serde(rename = "HIGH_FAILURE_RATE")]
    HighFailureRate,
    /// Inconsistency rate above the configured maximum.
    #[serde(rename = "HIGH_INCONSISTENCY_RATE")]
    HighInconsistencyRate,
    /// More stale connections cleaned than the configured maximum.
    #[serde(rename = "HIGH_STALE_CONNECTIONS")]
    HighStaleConnections,
}

/// Interval settings as exposed on the admin surface, in milliseconds.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntervalsDto {
    pub reconciliation_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    pub monitoring_interval_ms: u64,
    pub stale_connection_ms: u64,
}

/// Alert thresholds as exposed on the admin surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThresholdsDto {
    pub max_failure_rate: f64,
    pub max_inconsistency_rate: f64,
    pub max_stale_connections: u64,
}

impl From<SyncConfig> for IntervalsDto {
    fn from(config: SyncConfig) -> Self {
        Self {
            reconciliation_interval_ms: config.reconciliation_interval.as_millis() as u64,
            cleanup_interval_ms: config.cleanup_interval.as_millis() as u64,
            monitoring_interval_ms: config.monitoring_interval.as_millis() as u64,
            stale_connection_ms: config.stale_connection_after.as_millis() as u64,
        }
    }
}

impl From<AlertThresholds> for ThresholdsDto {
    fn from(thresholds: AlertThresholds) -> Self {
        Self {
            max_failure_rate: thresholds.max_failure_rate,
            max_inconsistency_rate: thresholds.max_inconsistency_rate,
            max_stale_connections: thresholds.max_stale_connections,
        }
    }
}

/// Full status payload for `GET /reconciliation/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconciliationStatusResponse {
    pub is_running: bool,
    pub intervals: IntervalsDto,
    pub thresholds: ThresholdsDto,
    pub stats: StatsSnapshot,
}

/// Partial configuration update accepted by `PUT /reconciliation/config`.
///
/// Missing fields keep their current value.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSyncConfigRequest {
    #[validate(range(min = 100))]
    pub reconciliation_interval_ms: Option<u64>,
    #[validate(range(min = 100))]
    pub cleanup_interval_ms: Option<u64>,
    #[validate(range(min = 100))]
    pub monitoring_interval_ms: Option<u64>,
    #[validate(range(min = 1000))]
    pub stale_connection_ms: Option<u64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_failure_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_inconsistency_rate: Option<f64>,
    pub max_stale_connections: Option<u64>,
}

impl UpdateSyncConfigRequest {
    /// Apply this partial update on top of an existing configuration.
    pub fn merged_into(&self, current: SyncConfig) -> SyncConfig {
        use std::time::Duration;

        SyncConfig {
            reconciliation_interval: self
                .reconciliation_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(current.reconciliation_interval),
            cleanup_interval: self
                .cleanup_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(current.cleanup_interval),
            monitoring_interval: self
                .monitoring_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(current.monitoring_interval),
            stale_connection_after: self
                .stale_connection_ms
                .map(Duration::from_millis)
                .unwrap_or(current.stale_connection_after),
            thresholds: AlertThresholds {
                max_failure_rate: self
                    .max_failure_rate
                    .unwrap_or(current.thresholds.max_failure_rate),
                max_inconsistency_rate: self
                    .max_inconsistency_rate
                    .unwrap_or(current.thresholds.max_inconsistency_rate),
                max_stale_connections: self
                    .max_stale_connections
                    .unwrap_or(current.thresholds.max_stale_connections),
            },
        }
    }
}

/// Result of a synchronous `POST /reconciliation/force/{room_id}` run.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForceReconcileResponse {
    pub room_id: Uuid,
    /// `false` when the room is not resident in this process (no-op success).
    pub active: bool,
    /// Version after the sweep, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub inconsistencies: Vec<Inconsistency>,
}
