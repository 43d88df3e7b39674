//! Periodic reconciliation, cleanup, and monitoring sweeps.
//!
//! Three independent tokio tasks gated by one idempotent `start`/`stop` pair.
//! Interval and threshold changes go through [`ReconciliationScheduler::update_config`],
//! which restarts the tasks so new values take effect without leaking timers.

use std::sync::RwLock;

use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    config::SyncConfig,
    services::{
        reconciliation::{self, ReconcileOutcome},
        room_events,
        stats::{self, ReconciliationStats},
    },
    state::SharedState,
};

/// Owns the periodic sweep tasks, their runtime configuration, and the
/// statistics they accumulate.
pub struct ReconciliationScheduler {
    config: RwLock<SyncConfig>,
    stats: ReconciliationStats,
    tasks: tokio::sync::Mutex<Option<SchedulerTasks>>,
}

struct SchedulerTasks {
    reconcile: JoinHandle<()>,
    cleanup: JoinHandle<()>,
    monitoring: JoinHandle<()>,
}

impl SchedulerTasks {
    fn abort_all(self) {
        self.reconcile.abort();
        self.cleanup.abort();
        self.monitoring.abort();
    }
}

impl ReconciliationScheduler {
    /// Build a stopped scheduler with the given initial configuration.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: RwLock::new(config),
            stats: ReconciliationStats::new(),
            tasks: tokio::sync::Mutex::new(None),
        }
    }

    /// Counters accumulated by the sweeps.
    pub fn stats(&self) -> &ReconciliationStats {
        &self.stats
    }

    /// Copy of the current runtime configuration.
    pub fn sync_config(&self) -> SyncConfig {
        *self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the periodic tasks are currently scheduled.
    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    /// Start the three periodic tasks. Calling `start` while running is a no-op.
    pub async fn start(&self, state: SharedState) {
        let mut guard = self.tasks.lock().await;
        if guard.is_some() {
            return;
        }

        let config = self.sync_config();
        info!(
            reconciliation_interval_ms = config.reconciliation_interval.as_millis() as u64,
            cleanup_interval_ms = config.cleanup_interval.as_millis() as u64,
            "starting reconciliation scheduler"
        );

        *guard = Some(SchedulerTasks {
            reconcile: tokio::spawn(run_reconcile_loop(state.clone(), config)),
            cleanup: tokio::spawn(run_cleanup_loop(state.clone(), config)),
            monitoring: tokio::spawn(run_monitoring_loop(state, config)),
        });
    }

    /// Cancel all periodic tasks. Calling `stop` while stopped is a no-op.
    pub async fn stop(&self) {
        let mut guard = self.tasks.lock().await;
        if let Some(tasks) = guard.take() {
            tasks.abort_all();
            info!("reconciliation scheduler stopped");
        }
    }

    /// Replace the runtime configuration. When the scheduler is running it is
    /// restarted so the new intervals take effect immediately.
    pub async fn update_config(&self, state: &SharedState, new_config: SyncConfig) {
        let was_running = {
            let mut guard = self.tasks.lock().await;
            match guard.take() {
                Some(tasks) => {
                    tasks.abort_all();
                    true
                }
                None => false,
            }
        };

        {
            let mut config = self
                .config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *config = new_config;
        }

        if was_running {
            self.start(state.clone()).await;
        }
    }
}

/// Sweep every active room once per interval, feeding the statistics.
async fn run_reconcile_loop(state: SharedState, config: SyncConfig) {
    loop {
        sleep(config.reconciliation_interval).await;
        run_reconcile_sweep(&state).await;
    }
}

async fn run_reconcile_sweep(state: &SharedState) {
    let rooms = state.active_rooms().await;
    debug!(rooms = rooms.len(), "reconciliation sweep starting");

    for room_id in rooms {
        match reconciliation::reconcile_room(state, room_id).await {
            Ok(ReconcileOutcome::Completed {
                inconsistencies, ..
            }) => {
                state.scheduler().stats().record_success(inconsistencies.len());
            }
            Ok(ReconcileOutcome::Inactive) => {}
            Err(err) if err.is_conflict() => {
                // A concurrent writer won; the next tick retries naturally.
                state.scheduler().stats().record_failure();
            }
            Err(err) => {
                warn!(%room_id, error = %err, "reconciliation sweep failed");
                state.scheduler().stats().record_failure();
            }
        }
    }
}

/// Garbage-collect connection records that have been non-live too long.
async fn run_cleanup_loop(state: SharedState, config: SyncConfig) {
    loop {
        sleep(config.cleanup_interval).await;
        let removed = state
            .registry()
            .cleanup_stale(config.stale_connection_after);
        if removed > 0 {
            debug!(removed, "cleaned up stale connection records");
            state.scheduler().stats().record_cleaned(removed);
        }
    }
}

/// Recompute derived rates and raise operator alerts on threshold breaches.
async fn run_monitoring_loop(state: SharedState, config: SyncConfig) {
    loop {
        sleep(config.monitoring_interval).await;
        let snapshot = state.scheduler().stats().snapshot();
        let alerts = stats::check_alert_conditions(&snapshot, &config.thresholds);
        for alert in &alerts {
            warn!(
                kind = ?alert.kind,
                value = alert.value,
                threshold = alert.threshold,
                "reconciliation alert raised"
            );
        }
        if !alerts.is_empty() {
            room_events::broadcast_alerts(&state, &alerts);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        state::{
            AppState,
            room::{LiveRoomState, ParticipantView},
        },
    };

    fn config_with_reconcile_interval(interval: Duration) -> AppConfig {
        let mut config = AppConfig::default();
        config.sync.reconciliation_interval = interval;
        config
    }

    async fn state_with_active_room(config: AppConfig) -> crate::state::SharedState {
        let state = AppState::new(config);
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;

        let host = Uuid::new_v4();
        let mut room = LiveRoomState::new("table".into(), host, "host".into());
        room.participants.insert(
            host,
            ParticipantView {
                display_name: "host".into(),
                is_live: true,
                is_ready: false,
                role: None,
            },
        );
        state.insert_room(room);
        state
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let state = state_with_active_room(AppConfig::default()).await;
        let scheduler = state.scheduler();

        scheduler.start(state.clone()).await;
        scheduler.start(state.clone()).await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_accumulate_into_stats() {
        let config = config_with_reconcile_interval(Duration::from_secs(5));
        let state = state_with_active_room(config).await;
        state.scheduler().start(state.clone()).await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        let snapshot = state.scheduler().stats().snapshot();
        assert!(snapshot.total_sweeps >= 2);
        assert_eq!(snapshot.failed_sweeps, 0);

        state.scheduler().stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn config_update_keeps_running_and_applies_the_new_interval() {
        let config = config_with_reconcile_interval(Duration::from_secs(1000));
        let state = state_with_active_room(config).await;
        let scheduler = state.scheduler();
        scheduler.start(state.clone()).await;

        // Nothing fires on the old, very long interval.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.stats().snapshot().total_sweeps, 0);

        let mut new_config = scheduler.sync_config();
        new_config.reconciliation_interval = Duration::from_secs(60);
        scheduler.update_config(&state, new_config).await;
        assert!(scheduler.is_running().await);

        // The next tick happens at the new interval, not the old one.
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(scheduler.stats().snapshot().total_sweeps >= 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slower_interval_stops_the_old_cadence() {
        let config = config_with_reconcile_interval(Duration::from_secs(5));
        let state = state_with_active_room(config).await;
        let scheduler = state.scheduler();
        scheduler.start(state.clone()).await;

        let mut new_config = scheduler.sync_config();
        new_config.reconciliation_interval = Duration::from_secs(3600);
        scheduler.update_config(&state, new_config).await;

        // The old 5s cadence would have fired many times by now.
        tokio::time::sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.stats().snapshot().total_sweeps, 0);

        scheduler.stop().await;
    }
}
