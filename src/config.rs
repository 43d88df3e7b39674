//! Application-level configuration loading, including heartbeat tuning and
//! the runtime-adjustable reconciliation settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CARD_TABLE_BACK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Liveness probing parameters, fixed for the process lifetime.
    pub heartbeat: HeartbeatConfig,
    /// Initial reconciliation settings; the scheduler can replace these at
    /// runtime through the operator surface.
    pub sync: SyncConfig,
}

/// Heartbeat probe tuning.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Delay between consecutive liveness probes for one participant.
    pub interval: Duration,
    /// Hard deadline for a probe response before the connection is declared dead.
    pub timeout: Duration,
}

/// Reconciliation sweep intervals and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Delay between reconciliation sweeps over the active rooms.
    pub reconciliation_interval: Duration,
    /// Delay between stale connection record cleanups.
    pub cleanup_interval: Duration,
    /// Delay between monitoring evaluations of the accumulated statistics.
    pub monitoring_interval: Duration,
    /// How long a non-live connection record may linger before cleanup.
    pub stale_connection_after: Duration,
    /// Thresholds above which the monitoring tick raises operator alerts.
    pub thresholds: AlertThresholds,
}

/// Thresholds evaluated by the monitoring tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Maximum tolerated ratio of failed sweeps to total sweeps.
    pub max_failure_rate: f64,
    /// Maximum tolerated ratio of sweeps that found at least one inconsistency.
    pub max_inconsistency_rate: f64,
    /// Maximum tolerated total of stale connection records cleaned up.
    pub max_stale_connections: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            monitoring_interval: Duration::from_secs(60),
            stale_connection_after: Duration::from_secs(600),
            thresholds: AlertThresholds::default(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.1,
            max_inconsistency_rate: 0.5,
            max_stale_connections: 100,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// built-in defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// All fields are optional; anything missing keeps its default value.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    heartbeat_interval_ms: Option<u64>,
    connection_timeout_ms: Option<u64>,
    reconciliation_interval_ms: Option<u64>,
    cleanup_interval_ms: Option<u64>,
    monitoring_interval_ms: Option<u64>,
    stale_connection_ms: Option<u64>,
    max_failure_rate: Option<f64>,
    max_inconsistency_rate: Option<f64>,
    max_stale_connections: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        Self {
            heartbeat: HeartbeatConfig {
                interval: millis(raw.heartbeat_interval_ms, defaults.heartbeat.interval),
                timeout: millis(raw.connection_timeout_ms, defaults.heartbeat.timeout),
            },
            sync: SyncConfig {
                reconciliation_interval: millis(
                    raw.reconciliation_interval_ms,
                    defaults.sync.reconciliation_interval,
                ),
                cleanup_interval: millis(raw.cleanup_interval_ms, defaults.sync.cleanup_interval),
                monitoring_interval: millis(
                    raw.monitoring_interval_ms,
                    defaults.sync.monitoring_interval,
                ),
                stale_connection_after: millis(
                    raw.stale_connection_ms,
                    defaults.sync.stale_connection_after,
                ),
                thresholds: AlertThresholds {
                    max_failure_rate: raw
                        .max_failure_rate
                        .unwrap_or(defaults.sync.thresholds.max_failure_rate),
                    max_inconsistency_rate: raw
                        .max_inconsistency_rate
                        .unwrap_or(defaults.sync.thresholds.max_inconsistency_rate),
                    max_stale_connections: raw
                        .max_stale_connections
                        .unwrap_or(defaults.sync.thresholds.max_stale_connections),
                },
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(30));
        assert_eq!(config.sync.thresholds.max_failure_rate, 0.1);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"reconciliation_interval_ms": 5000}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.sync.reconciliation_interval, Duration::from_secs(5));
        assert_eq!(config.sync.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(30));
    }
}
