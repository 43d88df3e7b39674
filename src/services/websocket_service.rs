use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ParticipantInboundMessage, ParticipantOutboundMessage},
    services::{connection_service, room_service},
    state::{SharedState, connection::DisconnectReason},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker error: the session's writer channel is gone.
#[derive(Debug)]
pub(crate) struct ConnectionClosed;

/// Handle the full lifecycle for an individual participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match ParticipantInboundMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse or validate participant message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ParticipantInboundMessage::Identification {
        participant_id,
        display_name,
    } = inbound
    else {
        warn!("first message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let session_id = Uuid::new_v4();
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<u64>();

    // Registration restores durable state into the live rooms before the ack
    // below goes out, so a rejoining participant never observes decayed state.
    let registration = connection_service::handle_register(
        &state,
        participant_id,
        display_name,
        session_id,
        outbound_tx.clone(),
        pong_tx,
        pong_rx,
    )
    .await;

    let ack = ParticipantOutboundMessage::ConnectionAck {
        participant_id,
        restored: registration.restored,
        rooms: registration.rooms,
    };
    if send_message_to_websocket(&outbound_tx, &ack).is_err() {
        info!(%participant_id, "connection closed during ack send, terminating");
        connection_service::handle_disconnect(
            &state,
            participant_id,
            DisconnectReason::TransportClosed,
        )
        .await;
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ParticipantInboundMessage::from_json_str(&text) {
                Ok(ParticipantInboundMessage::Heartbeat { nonce }) => {
                    state.registry().route_pong(participant_id, nonce);
                }
                Ok(ParticipantInboundMessage::Ready { room_id, is_ready }) => {
                    if let Err(err) =
                        room_service::set_ready(&state, participant_id, room_id, is_ready).await
                    {
                        warn!(%participant_id, %room_id, error = %err, "ready update rejected");
                    }
                }
                Ok(ParticipantInboundMessage::Identification { .. }) => {
                    warn!(%participant_id, "ignoring duplicate identification message");
                }
                Ok(ParticipantInboundMessage::Unknown) => {
                    warn!(%participant_id, "ignoring unknown participant message");
                }
                Err(err) => {
                    warn!(%participant_id, error = %err, "failed to parse or validate participant message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%participant_id, "participant closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%participant_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Only report the disconnect if this socket is still the participant's
    // current session; a replaced socket must not undo a newer registration.
    let still_current = state
        .registry()
        .record(participant_id)
        .is_some_and(|record| record.session_id == session_id);
    if still_current {
        connection_service::handle_disconnect(
            &state,
            participant_id,
            DisconnectReason::TransportClosed,
        )
        .await;
    }

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `Ok(())` if the message was successfully queued for sending or if
/// serialization failed (permanent error, no point retrying).
/// Returns `Err(ConnectionClosed)` if the writer channel is closed.
pub(crate) fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            // Serialization failure is a bug in this crate, not the peer.
            warn!(error = %err, "failed to serialize message `{value:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
