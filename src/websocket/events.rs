//! Fan-out helpers shared by the HTTP routes and the WebSocket session.
//!
//! A message persisted over either transport is announced to every
//! connection currently joined to the conversation's room, so devices see
//! the same feed regardless of how the sender reached the service.

use uuid::Uuid;

use crate::models::Message;
use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::{ConnectionRegistry, SubscriberId};

/// Announce a freshly persisted message to the conversation's room.
pub async fn broadcast_message_new(registry: &ConnectionRegistry, message: &Message) {
    let event = WsOutboundEvent::MessageNew {
        message: message.clone(),
    };
    match serde_json::to_string(&event) {
        Ok(payload) => registry.broadcast(message.conversation_id, payload).await,
        Err(e) => tracing::error!(error = %e, "failed to encode message:new event"),
    }
}

/// Relay a typing-state change to everyone in the room except the
/// originating connection.
pub async fn broadcast_typing(
    registry: &ConnectionRegistry,
    conversation_id: Uuid,
    origin: SubscriberId,
    user_id: Uuid,
    is_typing: bool,
) {
    let event = WsOutboundEvent::TypingState {
        conversation_id,
        user_id,
        is_typing,
    };
    match serde_json::to_string(&event) {
        Ok(payload) => {
            registry
                .broadcast_except(conversation_id, origin, payload)
                .await
        }
        Err(e) => tracing::error!(error = %e, "failed to encode typing:state event"),
    }
}
