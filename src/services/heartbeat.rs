//! Per-participant liveness probing.
//!
//! Each live connection gets one monitor task: send a timestamped probe,
//! wait for the matching response until the configured deadline, feed the
//! round trip back to the registry, repeat. A missed deadline declares the
//! connection dead. Restarting monitoring for a participant aborts the
//! previous task first, so no two monitors ever run for the same participant.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ParticipantOutboundMessage,
    services::{connection_service, websocket_service::send_message_to_websocket},
    state::{SharedState, connection::DisconnectReason},
};

/// Spawn the monitor task for a participant, replacing any previous one.
pub fn start_monitor(
    state: SharedState,
    participant_id: Uuid,
    pong_rx: mpsc::UnboundedReceiver<u64>,
) {
    let handle = tokio::spawn(run_monitor(state.clone(), participant_id, pong_rx));
    state.registry().install_monitor(participant_id, handle);
}

/// Abort the monitor task for a participant, if one is running.
pub fn stop_monitor(state: &SharedState, participant_id: Uuid) {
    state.registry().remove_monitor(participant_id);
}

async fn run_monitor(
    state: SharedState,
    participant_id: Uuid,
    mut pong_rx: mpsc::UnboundedReceiver<u64>,
) {
    let interval = state.config().heartbeat.interval;
    let deadline = state.config().heartbeat.timeout;

    loop {
        let Some(tx) = state.registry().live_sender(participant_id) else {
            // Disconnected through another path; nothing left to probe.
            break;
        };

        let nonce: u64 = rand::random();
        let sent = Instant::now();
        let probe = ParticipantOutboundMessage::HeartbeatProbe {
            nonce,
            sent_at_ms: unix_millis(),
        };

        if send_message_to_websocket(&tx, &probe).is_err() {
            debug!(%participant_id, "probe send failed; writer closed");
            connection_service::handle_disconnect(
                &state,
                participant_id,
                DisconnectReason::TransportClosed,
            )
            .await;
            break;
        }

        match timeout(deadline, wait_for_pong(&mut pong_rx, nonce)).await {
            Ok(true) => {
                let round_trip_ms = sent.elapsed().as_millis() as u32;
                state
                    .registry()
                    .record_heartbeat(participant_id, round_trip_ms);
                tokio::time::sleep(interval).await;
            }
            Ok(false) => {
                // Pong channel closed: the socket task is tearing down and
                // will report the disconnect itself.
                break;
            }
            Err(_) => {
                warn!(%participant_id, "heartbeat deadline exceeded; declaring disconnect");
                connection_service::handle_disconnect(
                    &state,
                    participant_id,
                    DisconnectReason::HeartbeatTimeout,
                )
                .await;
                break;
            }
        }
    }
}

/// Wait for the response matching `nonce`, draining stale nonces from
/// earlier probes. Returns `false` when the channel closed.
async fn wait_for_pong(pong_rx: &mut mpsc::UnboundedReceiver<u64>, nonce: u64) -> bool {
    while let Some(received) = pong_rx.recv().await {
        if received == nonce {
            return true;
        }
    }
    false
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::Message;
    use serde_json::Value;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, SharedState},
    };

    fn register_participant(
        state: &SharedState,
    ) -> (
        Uuid,
        mpsc::UnboundedReceiver<Message>,
        mpsc::UnboundedSender<u64>,
        mpsc::UnboundedReceiver<u64>,
    ) {
        let participant_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        state.registry().register(
            participant_id,
            "Ada".into(),
            Uuid::new_v4(),
            tx,
            pong_tx.clone(),
        );
        (participant_id, rx, pong_tx, pong_rx)
    }

    fn probe_nonce(message: &Message) -> Option<u64> {
        let Message::Text(text) = message else {
            return None;
        };
        let value: Value = serde_json::from_str(text.as_str()).ok()?;
        if value.get("type").and_then(Value::as_str) != Some("heartbeat") {
            return None;
        }
        value.get("nonce").and_then(Value::as_u64)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_participant_times_out_after_the_deadline() {
        let state = AppState::new(AppConfig::default());
        let (participant_id, mut rx, _pong_tx, pong_rx) = register_participant(&state);

        start_monitor(state.clone(), participant_id, pong_rx);

        // The first probe goes out immediately.
        let first = rx.recv().await.unwrap();
        assert!(probe_nonce(&first).is_some());

        // Not before the deadline...
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(state.registry().is_live(participant_id));

        // ...but shortly after it, the participant is declared dead.
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(!state.registry().is_live(participant_id));
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_participant_stays_live() {
        let state = AppState::new(AppConfig::default());
        let (participant_id, mut rx, pong_tx, pong_rx) = register_participant(&state);

        // Echo every probe nonce straight back.
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Some(nonce) = probe_nonce(&message) {
                    let _ = pong_tx.send(nonce);
                }
            }
        });

        start_monitor(state.clone(), participant_id, pong_rx);

        // Survives well past several probe cycles.
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(state.registry().is_live(participant_id));
        let record = state.registry().record(participant_id).unwrap();
        assert!(record.latency_ms.is_some());

        stop_monitor(&state, participant_id);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_nonces_are_drained_not_matched() {
        let state = AppState::new(AppConfig::default());
        let (participant_id, mut rx, pong_tx, pong_rx) = register_participant(&state);

        start_monitor(state.clone(), participant_id, pong_rx);

        let first = rx.recv().await.unwrap();
        let nonce = probe_nonce(&first).unwrap();

        // A garbage nonce must not count as a response.
        let _ = pong_tx.send(nonce.wrapping_add(1));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(!state.registry().is_live(participant_id));
    }
}
