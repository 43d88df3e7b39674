//! Accumulating reconciliation statistics and alert evaluation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    config::AlertThresholds,
    dto::admin::{Alert, AlertKind, StatsSnapshot},
};

/// Monotonic counters shared between the scheduler ticks and the admin
/// surface. Reset only by an explicit operator action.
#[derive(Debug, Default)]
pub struct ReconciliationStats {
    total_sweeps: AtomicU64,
    successful_sweeps: AtomicU64,
    failed_sweeps: AtomicU64,
    inconsistencies_found: AtomicU64,
    sweeps_with_inconsistencies: AtomicU64,
    stale_connections_cleaned: AtomicU64,
}

impl ReconciliationStats {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sweep that completed, with the number of inconsistencies it found.
    pub fn record_success(&self, inconsistencies: usize) {
        self.total_sweeps.fetch_add(1, Ordering::Relaxed);
        self.successful_sweeps.fetch_add(1, Ordering::Relaxed);
        self.inconsistencies_found
            .fetch_add(inconsistencies as u64, Ordering::Relaxed);
        if inconsistencies > 0 {
            self.sweeps_with_inconsistencies
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a sweep that failed (conflict or storage outage).
    pub fn record_failure(&self) {
        self.total_sweeps.fetch_add(1, Ordering::Relaxed);
        self.failed_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record connection records removed by the cleanup tick.
    pub fn record_cleaned(&self, count: usize) {
        self.stale_connections_cleaned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Derive the current rates and return a serializable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total_sweeps.load(Ordering::Relaxed);
        let successful = self.successful_sweeps.load(Ordering::Relaxed);
        let failed = self.failed_sweeps.load(Ordering::Relaxed);
        let inconsistencies = self.inconsistencies_found.load(Ordering::Relaxed);
        let affected = self.sweeps_with_inconsistencies.load(Ordering::Relaxed);
        let cleaned = self.stale_connections_cleaned.load(Ordering::Relaxed);

        let rate = |value: u64| {
            if total == 0 {
                0.0
            } else {
                value as f64 / total as f64
            }
        };

        StatsSnapshot {
            total_sweeps: total,
            successful_sweeps: successful,
            failed_sweeps: failed,
            inconsistencies_found: inconsistencies,
            sweeps_with_inconsistencies: affected,
            stale_connections_cleaned: cleaned,
            success_rate: rate(successful),
            failure_rate: rate(failed),
            inconsistency_rate: rate(affected),
            avg_inconsistencies_per_sweep: rate(inconsistencies),
        }
    }

    /// Zero every counter. Operator action only.
    pub fn reset(&self) {
        self.total_sweeps.store(0, Ordering::Relaxed);
        self.successful_sweeps.store(0, Ordering::Relaxed);
        self.failed_sweeps.store(0, Ordering::Relaxed);
        self.inconsistencies_found.store(0, Ordering::Relaxed);
        self.sweeps_with_inconsistencies.store(0, Ordering::Relaxed);
        self.stale_connections_cleaned.store(0, Ordering::Relaxed);
    }
}

/// Evaluate alert conditions against the configured thresholds.
///
/// Alerts are emitted, not auto-remediated; callers forward them to the
/// operator stream.
pub fn check_alert_conditions(stats: &StatsSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if stats.total_sweeps > 0 && stats.failure_rate > thresholds.max_failure_rate {
        alerts.push(Alert {
            kind: AlertKind::HighFailureRate,
            message: format!(
                "reconciliation failure rate {:.2} exceeds {:.2}",
                stats.failure_rate, thresholds.max_failure_rate
            ),
            value: stats.failure_rate,
            threshold: thresholds.max_failure_rate,
        });
    }

    if stats.total_sweeps > 0 && stats.inconsistency_rate > thresholds.max_inconsistency_rate {
        alerts.push(Alert {
            kind: AlertKind::HighInconsistencyRate,
            message: format!(
                "inconsistency rate {:.2} exceeds {:.2}",
                stats.inconsistency_rate, thresholds.max_inconsistency_rate
            ),
            value: stats.inconsistency_rate,
            threshold: thresholds.max_inconsistency_rate,
        });
    }

    if stats.stale_connections_cleaned > thresholds.max_stale_connections {
        alerts.push(Alert {
            kind: AlertKind::HighStaleConnections,
            message: format!(
                "{} stale connections cleaned exceeds {}",
                stats.stale_connections_cleaned, thresholds.max_stale_connections
            ),
            value: stats.stale_connections_cleaned as f64,
            threshold: thresholds.max_stale_connections as f64,
        });
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_over_threshold_raises_alert() {
        let stats = ReconciliationStats::new();
        for _ in 0..8 {
            stats.record_success(0);
        }
        stats.record_failure();
        stats.record_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_sweeps, 10);
        assert_eq!(snapshot.failed_sweeps, 2);

        let thresholds = AlertThresholds {
            max_failure_rate: 0.10,
            max_inconsistency_rate: 1.0,
            max_stale_connections: u64::MAX,
        };
        let alerts = check_alert_conditions(&snapshot, &thresholds);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighFailureRate);
    }

    #[test]
    fn no_alert_at_or_below_threshold() {
        let stats = ReconciliationStats::new();
        for _ in 0..9 {
            stats.record_success(0);
        }
        stats.record_failure();

        let thresholds = AlertThresholds {
            max_failure_rate: 0.10,
            max_inconsistency_rate: 1.0,
            max_stale_connections: u64::MAX,
        };
        assert!(check_alert_conditions(&stats.snapshot(), &thresholds).is_empty());
    }

    #[test]
    fn inconsistency_rate_counts_affected_sweeps_not_findings() {
        let stats = ReconciliationStats::new();
        stats.record_success(5);
        stats.record_success(0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.inconsistency_rate, 0.5);
        assert_eq!(snapshot.avg_inconsistencies_per_sweep, 2.5);
    }

    #[test]
    fn stale_connection_alert_uses_running_total() {
        let stats = ReconciliationStats::new();
        stats.record_cleaned(7);
        stats.record_cleaned(4);

        let thresholds = AlertThresholds {
            max_failure_rate: 1.0,
            max_inconsistency_rate: 1.0,
            max_stale_connections: 10,
        };
        let alerts = check_alert_conditions(&stats.snapshot(), &thresholds);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighStaleConnections);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let stats = ReconciliationStats::new();
        stats.record_success(3);
        stats.record_failure();
        stats.record_cleaned(2);

        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_sweeps, 0);
        assert_eq!(snapshot.inconsistencies_found, 0);
        assert_eq!(snapshot.stale_connections_cleaned, 0);
        assert_eq!(snapshot.failure_rate, 0.0);
    }

    #[test]
    fn empty_stats_raise_no_rate_alerts() {
        let stats = ReconciliationStats::new();
        let thresholds = AlertThresholds {
            max_failure_rate: 0.0,
            max_inconsistency_rate: 0.0,
            max_stale_connections: 0,
        };
        assert!(check_alert_conditions(&stats.snapshot(), &thresholds).is_empty());
    }
}
