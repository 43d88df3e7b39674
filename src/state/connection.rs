use std::time::{Duration, SystemTime};

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

/// Latency tier derived from the most recent heartbeat round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    /// Round trip under 100ms.
    Excellent,
    /// Round trip under 300ms.
    Good,
    /// Round trip under 1000ms.
    Fair,
    /// Anything slower.
    Poor,
}

impl ConnectionQuality {
    /// Classify a heartbeat round trip by the fixed tier thresholds.
    pub fn for_latency(round_trip_ms: u32) -> Self {
        match round_trip_ms {
            0..100 => ConnectionQuality::Excellent,
            100..300 => ConnectionQuality::Good,
            300..1000 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }
}

/// Why a participant was marked disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No heartbeat response arrived before the deadline.
    HeartbeatTimeout,
    /// The WebSocket closed or errored.
    TransportClosed,
}

impl DisconnectReason {
    /// Stable label used in logs and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::HeartbeatTimeout => "heartbeat_timeout",
            DisconnectReason::TransportClosed => "transport_closed",
        }
    }
}

/// Outcome of a registry registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// First session for this participant (or a refresh of a live one).
    Connected,
    /// The participant returned after being non-live.
    Reconnected,
}

/// One participant's transport session as tracked by the registry.
///
/// Mutated only through [`ConnectionRegistry`] methods.
#[derive(Clone)]
pub struct ConnectionRecord {
    /// Stable identifier for the participant.
    pub participant_id: Uuid,
    /// Display name presented during identification.
    pub display_name: String,
    /// Identifier of the current transport session.
    pub session_id: Uuid,
    /// Outbound channel feeding the session's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Channel routing heartbeat responses to the participant's monitor.
    pub pong_tx: mpsc::UnboundedSender<u64>,
    /// Whether the transport is currently considered alive.
    pub is_live: bool,
    /// When the current session was established.
    pub connected_at: SystemTime,
    /// Last moment any heartbeat response was seen.
    pub last_seen_at: SystemTime,
    /// When the participant went non-live, if they did.
    pub disconnected_at: Option<SystemTime>,
    /// Number of times this participant returned after a drop.
    pub reconnect_count: u32,
    /// Most recent heartbeat round trip.
    pub latency_ms: Option<u32>,
    /// Latency tier derived from `latency_ms`.
    pub quality: ConnectionQuality,
}

/// Participant ↔ transport session map; the single source of truth for
/// "is this participant currently reachable".
///
/// Holds no room membership beyond the mapping itself. Records are never
/// removed on disconnect; only the cleanup sweep garbage-collects them.
#[derive(Default)]
pub struct ConnectionRegistry {
    records: DashMap<Uuid, ConnectionRecord>,
    monitors: DashMap<Uuid, JoinHandle<()>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the record for a connecting participant.
    ///
    /// Returns [`RegisterKind::Reconnected`] (and bumps `reconnect_count`)
    /// when a prior non-live record existed.
    pub fn register(
        &self,
        participant_id: Uuid,
        display_name: String,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<Message>,
        pong_tx: mpsc::UnboundedSender<u64>,
    ) -> RegisterKind {
        let now = SystemTime::now();
        match self.records.get_mut(&participant_id) {
            Some(mut record) => {
                let kind = if record.is_live {
                    RegisterKind::Connected
                } else {
                    record.reconnect_count += 1;
                    RegisterKind::Reconnected
                };
                record.display_name = display_name;
                record.session_id = session_id;
                record.tx = tx;
                record.pong_tx = pong_tx;
                record.is_live = true;
                record.connected_at = now;
                record.last_seen_at = now;
                record.disconnected_at = None;
                kind
            }
            None => {
                self.records.insert(
                    participant_id,
                    ConnectionRecord {
                        participant_id,
                        display_name,
                        session_id,
                        tx,
                        pong_tx,
                        is_live: true,
                        connected_at: now,
                        last_seen_at: now,
                        disconnected_at: None,
                        reconnect_count: 0,
                        latency_ms: None,
                        quality: ConnectionQuality::Excellent,
                    },
                );
                RegisterKind::Connected
            }
        }
    }

    /// Flip a participant to non-live. Returns `false` when the participant
    /// was unknown or already non-live (idempotent no-op).
    pub fn mark_disconnected(&self, participant_id: Uuid, _reason: DisconnectReason) -> bool {
        match self.records.get_mut(&participant_id) {
            Some(mut record) if record.is_live => {
                record.is_live = false;
                record.disconnected_at = Some(SystemTime::now());
                true
            }
            _ => false,
        }
    }

    /// Record a heartbeat round trip and recompute the quality tier.
    pub fn record_heartbeat(&self, participant_id: Uuid, round_trip_ms: u32) {
        if let Some(mut record) = self.records.get_mut(&participant_id) {
            record.last_seen_at = SystemTime::now();
            record.latency_ms = Some(round_trip_ms);
            record.quality = ConnectionQuality::for_latency(round_trip_ms);
        }
    }

    /// Whether the participant currently has a live transport session.
    pub fn is_live(&self, participant_id: Uuid) -> bool {
        self.records
            .get(&participant_id)
            .is_some_and(|record| record.is_live)
    }

    /// Snapshot of a participant's record.
    pub fn record(&self, participant_id: Uuid) -> Option<ConnectionRecord> {
        self.records
            .get(&participant_id)
            .map(|record| record.value().clone())
    }

    /// Outbound sender for a participant, only while they are live.
    pub fn live_sender(&self, participant_id: Uuid) -> Option<mpsc::UnboundedSender<Message>> {
        self.records
            .get(&participant_id)
            .filter(|record| record.is_live)
            .map(|record| record.tx.clone())
    }

    /// Route a heartbeat response nonce to the participant's monitor task.
    pub fn route_pong(&self, participant_id: Uuid, nonce: u64) {
        if let Some(record) = self.records.get(&participant_id) {
            let _ = record.pong_tx.send(nonce);
        }
    }

    /// Drop records that have been non-live for longer than `stale_after`.
    /// Returns the number of records removed.
    pub fn cleanup_stale(&self, stale_after: Duration) -> usize {
        let now = SystemTime::now();
        let before = self.records.len();
        self.records.retain(|_, record| {
            if record.is_live {
                return true;
            }
            match record.disconnected_at {
                Some(at) => now
                    .duration_since(at)
                    .map(|idle| idle < stale_after)
                    .unwrap_or(true),
                None => true,
            }
        });
        before - self.records.len()
    }

    /// Install the heartbeat monitor task for a participant, aborting any
    /// previous one so no two monitors run concurrently.
    pub fn install_monitor(&self, participant_id: Uuid, handle: JoinHandle<()>) {
        if let Some((_, previous)) = self.monitors.remove(&participant_id) {
            previous.abort();
        }
        self.monitors.insert(participant_id, handle);
    }

    /// Stop and forget the heartbeat monitor for a participant.
    pub fn remove_monitor(&self, participant_id: Uuid) {
        if let Some((_, handle)) = self.monitors.remove(&participant_id) {
            handle.abort();
        }
    }

    /// Abort every monitor task; used on shutdown so no timer outlives the
    /// registry it acts on.
    pub fn shutdown(&self) {
        for entry in self.monitors.iter() {
            entry.value().abort();
        }
        self.monitors.clear();
    }

    /// Number of records currently held, live or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedSender<u64>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pong_tx, _pong_rx) = mpsc::unbounded_channel();
        (tx, pong_tx, rx)
    }

    #[test]
    fn quality_tiers_follow_fixed_thresholds() {
        assert_eq!(
            ConnectionQuality::for_latency(99),
            ConnectionQuality::Excellent
        );
        assert_eq!(ConnectionQuality::for_latency(100), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::for_latency(299), ConnectionQuality::Good);
        assert_eq!(ConnectionQuality::for_latency(300), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::for_latency(999), ConnectionQuality::Fair);
        assert_eq!(ConnectionQuality::for_latency(1000), ConnectionQuality::Poor);
    }

    #[test]
    fn first_register_is_connected_and_live() {
        let registry = ConnectionRegistry::new();
        let participant = Uuid::new_v4();
        let (tx, pong_tx, _rx) = channels();

        let kind = registry.register(participant, "Ada".into(), Uuid::new_v4(), tx, pong_tx);
        assert_eq!(kind, RegisterKind::Connected);
        assert!(registry.is_live(participant));
        assert_eq!(registry.record(participant).unwrap().reconnect_count, 0);
    }

    #[test]
    fn returning_after_a_drop_counts_as_reconnect() {
        let registry = ConnectionRegistry::new();
        let participant = Uuid::new_v4();
        let (tx, pong_tx, _rx) = channels();
        registry.register(participant, "Ada".into(), Uuid::new_v4(), tx, pong_tx);
        registry.mark_disconnected(participant, DisconnectReason::TransportClosed);

        let (tx, pong_tx, _rx) = channels();
        let kind = registry.register(participant, "Ada".into(), Uuid::new_v4(), tx, pong_tx);
        assert_eq!(kind, RegisterKind::Reconnected);
        let record = registry.record(participant).unwrap();
        assert_eq!(record.reconnect_count, 1);
        assert!(record.is_live);
        assert!(record.disconnected_at.is_none());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let participant = Uuid::new_v4();
        let (tx, pong_tx, _rx) = channels();
        registry.register(participant, "Ada".into(), Uuid::new_v4(), tx, pong_tx);

        assert!(registry.mark_disconnected(participant, DisconnectReason::TransportClosed));
        let after_first = registry.record(participant).unwrap().disconnected_at;

        // Second call must change nothing observable.
        assert!(!registry.mark_disconnected(participant, DisconnectReason::TransportClosed));
        let record = registry.record(participant).unwrap();
        assert!(!record.is_live);
        assert_eq!(record.disconnected_at, after_first);
    }

    #[test]
    fn heartbeat_updates_latency_and_quality() {
        let registry = ConnectionRegistry::new();
        let participant = Uuid::new_v4();
        let (tx, pong_tx, _rx) = channels();
        registry.register(participant, "Ada".into(), Uuid::new_v4(), tx, pong_tx);

        registry.record_heartbeat(participant, 450);
        let record = registry.record(participant).unwrap();
        assert_eq!(record.latency_ms, Some(450));
        assert_eq!(record.quality, ConnectionQuality::Fair);
    }

    #[test]
    fn cleanup_removes_only_long_gone_records() {
        let registry = ConnectionRegistry::new();
        let gone = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let live = Uuid::new_v4();
        for id in [gone, fresh, live] {
            let (tx, pong_tx, _rx) = channels();
            registry.register(id, "p".into(), Uuid::new_v4(), tx, pong_tx);
        }
        registry.mark_disconnected(gone, DisconnectReason::TransportClosed);
        registry.mark_disconnected(fresh, DisconnectReason::TransportClosed);

        // Artificially age the first disconnection.
        registry.records.get_mut(&gone).unwrap().disconnected_at =
            Some(SystemTime::now() - Duration::from_secs(3600));

        let removed = registry.cleanup_stale(Duration::from_secs(600));
        assert_eq!(removed, 1);
        assert!(registry.record(gone).is_none());
        assert!(registry.record(fresh).is_some());
        assert!(registry.is_live(live));
    }
}
