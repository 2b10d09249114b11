//! WebSocket gateway.
//!
//! One connection per authenticated user; rooms are joined and left over the
//! socket itself. All authorization goes through the services, so a socket
//! send enforces exactly the same rules as the HTTP send route.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::decode_token;
use crate::state::AppState;
use crate::websocket::events::{broadcast_message_new, broadcast_typing};
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::SubscriberId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// Fan-out payload forwarded from the registry to this connection.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Deliver(String);

// Confirms an async room subscription back to the actor.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Subscribed {
    conversation_id: Uuid,
    subscriber_id: SubscriberId,
}

// Reports a failed join so the pending slot is released.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct JoinFailed {
    conversation_id: Uuid,
    payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomSlot {
    /// Join accepted, registry subscription still in flight.
    Pending,
    Active(SubscriberId),
}

/// Per-connection room bookkeeping.
///
/// A join registers with the registry asynchronously, so the slot is claimed
/// synchronously first; a second join frame for the same room while the first
/// is still in flight is rejected instead of registering twice.
#[derive(Default)]
struct SessionRooms {
    slots: HashMap<Uuid, RoomSlot>,
}

impl SessionRooms {
    /// Claims the room slot. Returns false when a join for this room is
    /// already pending or active.
    fn begin_join(&mut self, conversation_id: Uuid) -> bool {
        match self.slots.entry(conversation_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RoomSlot::Pending);
                true
            }
        }
    }

    /// Records a completed subscription. Returns the subscription back when
    /// its slot no longer exists or is already active (the room was left, or
    /// another registration won) so the caller releases it from the registry.
    fn complete_join(
        &mut self,
        conversation_id: Uuid,
        subscriber_id: SubscriberId,
    ) -> Option<SubscriberId> {
        match self.slots.get_mut(&conversation_id) {
            Some(slot) if *slot == RoomSlot::Pending => {
                *slot = RoomSlot::Active(subscriber_id);
                None
            }
            _ => Some(subscriber_id),
        }
    }

    /// Releases a pending claim after a failed join.
    fn abort_join(&mut self, conversation_id: Uuid) {
        if self.slots.get(&conversation_id) == Some(&RoomSlot::Pending) {
            self.slots.remove(&conversation_id);
        }
    }

    /// Drops the slot; returns the subscription to release when one is live.
    fn leave(&mut self, conversation_id: Uuid) -> Option<SubscriberId> {
        match self.slots.remove(&conversation_id) {
            Some(RoomSlot::Active(id)) => Some(id),
            _ => None,
        }
    }

    fn active(&self, conversation_id: Uuid) -> Option<SubscriberId> {
        match self.slots.get(&conversation_id) {
            Some(RoomSlot::Active(id)) => Some(*id),
            _ => None,
        }
    }

    fn drain_active(&mut self) -> Vec<(Uuid, SubscriberId)> {
        self.slots
            .drain()
            .filter_map(|(conversation_id, slot)| match slot {
                RoomSlot::Active(id) => Some((conversation_id, id)),
                RoomSlot::Pending => None,
            })
            .collect()
    }
}

struct WsSession {
    user_id: Uuid,
    state: AppState,
    hb: Instant,
    rooms: SessionRooms,
}

fn error_payload(err: &AppError, conversation_id: Option<Uuid>) -> String {
    let event = WsOutboundEvent::Error {
        code: err.code().to_string(),
        message: err.to_string(),
        conversation_id,
    };
    serde_json::to_string(&event).unwrap_or_else(|_| {
        r#"{"type":"error","code":"internal_error","message":"internal server error"}"#.to_string()
    })
}

impl WsSession {
    fn new(user_id: Uuid, state: AppState) -> Self {
        Self {
            user_id,
            state,
            hb: Instant::now(),
            rooms: SessionRooms::default(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat timed out");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_join_ack(conversation_id: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if let Ok(ack) = serde_json::to_string(&WsOutboundEvent::RoomJoined { conversation_id }) {
            ctx.text(ack);
        }
    }

    fn handle_join(&mut self, conversation_id: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if !self.rooms.begin_join(conversation_id) {
            // Re-ack an established room; a still-pending join acks when it
            // completes.
            if self.rooms.active(conversation_id).is_some() {
                Self::send_join_ack(conversation_id, ctx);
            }
            return;
        }

        let state = self.state.clone();
        let user_id = self.user_id;
        let addr = ctx.address();
        actix::spawn(async move {
            // Participancy check, same path as HTTP reads.
            if let Err(e) = state
                .conversations
                .get_conversation(conversation_id, user_id)
                .await
            {
                addr.do_send(JoinFailed {
                    conversation_id,
                    payload: error_payload(&e, Some(conversation_id)),
                });
                return;
            }

            let (subscriber_id, mut rx) =
                state.registry.add_subscriber(conversation_id, user_id).await;

            // Bridge room fan-out into the actor mailbox; ends when the
            // subscription is removed and the sender side drops.
            let forward = addr.clone();
            tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    forward.do_send(Deliver(payload));
                }
            });

            // The session may have stopped while registering; release the
            // subscription rather than leak it.
            if addr
                .send(Subscribed {
                    conversation_id,
                    subscriber_id,
                })
                .await
                .is_err()
            {
                state
                    .registry
                    .remove_subscriber(conversation_id, subscriber_id)
                    .await;
            }
        });
    }

    fn handle_leave(&mut self, conversation_id: Uuid) {
        if let Some(subscriber_id) = self.rooms.leave(conversation_id) {
            let registry = self.state.registry.clone();
            actix::spawn(async move {
                registry.remove_subscriber(conversation_id, subscriber_id).await;
            });
        }
    }

    fn handle_send(
        &self,
        conversation_id: Uuid,
        content: String,
        reply_to: Option<Uuid>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let state = self.state.clone();
        let user_id = self.user_id;
        let addr = ctx.address();
        actix::spawn(async move {
            match state
                .messages
                .send(conversation_id, user_id, &content, None, reply_to)
                .await
            {
                Ok(message) => broadcast_message_new(&state.registry, &message).await,
                Err(e) => addr.do_send(Deliver(error_payload(&e, Some(conversation_id)))),
            }
        });
    }

    fn handle_typing(
        &self,
        conversation_id: Uuid,
        is_typing: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        // Typing is only relayed within rooms this connection has joined.
        let Some(origin) = self.rooms.active(conversation_id) else {
            ctx.text(error_payload(
                &AppError::InvalidOperation("join the conversation first".into()),
                Some(conversation_id),
            ));
            return;
        };

        let registry = self.state.registry.clone();
        let user_id = self.user_id;
        actix::spawn(async move {
            broadcast_typing(&registry, conversation_id, origin, user_id, is_typing).await;
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session stopped");

        let registry = self.state.registry.clone();
        let rooms = self.rooms.drain_active();
        actix::spawn(async move {
            for (conversation_id, subscriber_id) in rooms {
                registry.remove_subscriber(conversation_id, subscriber_id).await;
            }
        });
    }
}

impl Handler<Deliver> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Subscribed> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Subscribed, ctx: &mut Self::Context) {
        if let Some(extra) = self
            .rooms
            .complete_join(msg.conversation_id, msg.subscriber_id)
        {
            let registry = self.state.registry.clone();
            let conversation_id = msg.conversation_id;
            actix::spawn(async move {
                registry.remove_subscriber(conversation_id, extra).await;
            });
            return;
        }
        Self::send_join_ack(msg.conversation_id, ctx);
    }
}

impl Handler<JoinFailed> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: JoinFailed, ctx: &mut Self::Context) {
        self.rooms.abort_join(msg.conversation_id);
        ctx.text(msg.payload);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(WsInboundEvent::Join { conversation_id }) => {
                    self.handle_join(conversation_id, ctx);
                }
                Ok(WsInboundEvent::Leave { conversation_id }) => {
                    self.handle_leave(conversation_id);
                }
                Ok(WsInboundEvent::Send {
                    conversation_id,
                    content,
                    reply_to,
                }) => {
                    self.handle_send(conversation_id, content, reply_to, ctx);
                }
                Ok(WsInboundEvent::Typing {
                    conversation_id,
                    is_typing,
                }) => {
                    self.handle_typing(conversation_id, is_typing, ctx);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "unparseable websocket event");
                    ctx.text(error_payload(
                        &AppError::Validation("unrecognized event".into()),
                        None,
                    ));
                }
            },
            Ok(ws::Message::Binary(_)) => {
                ctx.text(error_payload(
                    &AppError::Validation("binary frames are not supported".into()),
                    None,
                ));
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(user_id = %self.user_id, ?reason, "websocket closed by client");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws
/// Upgrade to a realtime session. The token comes from the `token` query
/// parameter or the `Authorization: Bearer` header.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query.into_inner().token.or_else(|| {
        req.headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    });

    let Some(token) = token else {
        return Ok(HttpResponse::Unauthorized().finish());
    };
    let claims = match decode_token(&token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => return Ok(HttpResponse::Unauthorized().finish()),
    };

    let session = WsSession::new(claims.sub, state.as_ref().clone());
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_join_is_rejected_while_the_first_is_in_flight() {
        let mut rooms = SessionRooms::default();
        let room = Uuid::new_v4();

        assert!(rooms.begin_join(room));
        // Same frame again before the registry confirmed the first join.
        assert!(!rooms.begin_join(room));

        let id = SubscriberId::new();
        assert_eq!(rooms.complete_join(room, id), None);
        assert_eq!(rooms.active(room), Some(id));

        // Still claimed once established.
        assert!(!rooms.begin_join(room));
    }

    #[test]
    fn completion_after_leave_hands_back_the_subscription() {
        let mut rooms = SessionRooms::default();
        let room = Uuid::new_v4();

        assert!(rooms.begin_join(room));
        // Left while the registration was in flight; nothing live to release.
        assert_eq!(rooms.leave(room), None);

        // The late confirmation must be released by the caller.
        let id = SubscriberId::new();
        assert_eq!(rooms.complete_join(room, id), Some(id));
        assert_eq!(rooms.active(room), None);
    }

    #[test]
    fn superseded_completion_is_handed_back_not_recorded() {
        let mut rooms = SessionRooms::default();
        let room = Uuid::new_v4();

        assert!(rooms.begin_join(room));
        let winner = SubscriberId::new();
        assert_eq!(rooms.complete_join(room, winner), None);

        // A stray duplicate confirmation never displaces the live one.
        let loser = SubscriberId::new();
        assert_eq!(rooms.complete_join(room, loser), Some(loser));
        assert_eq!(rooms.active(room), Some(winner));
    }

    #[test]
    fn failed_join_releases_the_claim() {
        let mut rooms = SessionRooms::default();
        let room = Uuid::new_v4();

        assert!(rooms.begin_join(room));
        rooms.abort_join(room);
        assert!(rooms.begin_join(room));

        // Abort never drops an established subscription.
        let id = SubscriberId::new();
        assert_eq!(rooms.complete_join(room, id), None);
        rooms.abort_join(room);
        assert_eq!(rooms.active(room), Some(id));
    }

    #[test]
    fn drain_skips_pending_joins() {
        let mut rooms = SessionRooms::default();
        let settled = Uuid::new_v4();
        let in_flight = Uuid::new_v4();

        rooms.begin_join(settled);
        let id = SubscriberId::new();
        rooms.complete_join(settled, id);
        rooms.begin_join(in_flight);

        let drained = rooms.drain_active();
        assert_eq!(drained, vec![(settled, id)]);
        assert_eq!(rooms.active(settled), None);
    }
}
