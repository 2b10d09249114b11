use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Inbound WebSocket events from client to server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Declare interest in a conversation's live feed. Participancy is
    /// re-verified server side before the room is joined.
    #[serde(rename = "join")]
    Join { conversation_id: Uuid },

    /// Stop receiving a conversation's live feed. Idempotent.
    #[serde(rename = "leave")]
    Leave { conversation_id: Uuid },

    /// Send a message through the same MessageService path as HTTP.
    #[serde(rename = "send")]
    Send {
        conversation_id: Uuid,
        content: String,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },

    /// Ephemeral typing-state change; never persisted.
    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
}

/// Outbound WebSocket events from server to client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    /// A message was persisted in a room this connection is joined to.
    /// Delivered to every room member; senders reconcile their own
    /// optimistic echo.
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    /// Typing-state change from another connection in the room. Best-effort;
    /// clients clear stale indicators after a few seconds of silence.
    #[serde(rename = "typing:state")]
    TypingState {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// Acknowledges a successful `join`.
    #[serde(rename = "room:joined")]
    RoomJoined { conversation_id: Uuid },

    /// Failure scoped to this connection only; never broadcast.
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_events_parse_from_wire_json() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"send","conversation_id":"{conversation_id}","content":"see you there"}}"#
        );
        match serde_json::from_str::<WsInboundEvent>(&raw).unwrap() {
            WsInboundEvent::Send {
                conversation_id: cid,
                content,
                reply_to,
            } => {
                assert_eq!(cid, conversation_id);
                assert_eq!(content, "see you there");
                assert!(reply_to.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn outbound_error_tags_correctly() {
        let event = WsOutboundEvent::Error {
            code: "forbidden".into(),
            message: "not a participant".into(),
            conversation_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json.get("conversation_id").is_none());
    }
}
