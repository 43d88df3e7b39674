use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::validation::validate_display_name;

/// Messages accepted from participant WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ParticipantInboundMessage {
    /// First message of every session, binding the socket to a participant.
    #[serde(rename = "identification")]
    Identification {
        participant_id: Uuid,
        display_name: String,
    },
    /// Response to a liveness probe, echoing the probe nonce.
    #[serde(rename = "heartbeat")]
    Heartbeat { nonce: u64 },
    /// Readiness toggle for one of the participant's rooms.
    #[serde(rename = "ready")]
    Ready { room_id: Uuid, is_ready: bool },
    #[serde(other)]
    Unknown,
}

impl ParticipantInboundMessage {
    /// Parse and validate an inbound frame.
    pub fn from_json_str(payload: &str) -> Result<Self, String> {
        let message: Self = serde_json::from_str(payload).map_err(|err| err.to_string())?;
        if let ParticipantInboundMessage::Identification { display_name, .. } = &message {
            validate_display_name(display_name).map_err(|err| err.to_string())?;
        }
        Ok(message)
    }
}

/// Control messages pushed to a participant outside of room events.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ParticipantOutboundMessage {
    /// Liveness probe; the client echoes `nonce` back in a heartbeat message.
    #[serde(rename = "heartbeat")]
    HeartbeatProbe {
        nonce: u64,
        /// Server clock at probe send, milliseconds since the Unix epoch.
        sent_at_ms: u64,
    },
    /// Acknowledgement sent after identification completes.
    #[serde(rename = "connection_ack")]
    ConnectionAck {
        participant_id: Uuid,
        /// Whether durable state was copied back into the live rooms. `false`
        /// means restoration was skipped and the next sweep will correct drift.
        restored: bool,
        /// Rooms the participant was restored into.
        rooms: Vec<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identification_frame_parses() {
        let raw = format!(
            r#"{{"type":"identification","participant_id":"{}","display_name":"Ada"}}"#,
            Uuid::new_v4()
        );
        let message = ParticipantInboundMessage::from_json_str(&raw).unwrap();
        assert!(matches!(
            message,
            ParticipantInboundMessage::Identification { .. }
        ));
    }

    #[test]
    fn blank_display_name_is_rejected() {
        let raw = format!(
            r#"{{"type":"identification","participant_id":"{}","display_name":"  "}}"#,
            Uuid::new_v4()
        );
        assert!(ParticipantInboundMessage::from_json_str(&raw).is_err());
    }

    #[test]
    fn unknown_frames_fall_through() {
        let message =
            ParticipantInboundMessage::from_json_str(r#"{"type":"mystery"}"#).unwrap();
        assert!(matches!(message, ParticipantInboundMessage::Unknown));
    }
}
