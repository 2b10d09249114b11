//! Realtime gateway internals.
//!
//! Room membership is process-local, in-memory state used exclusively for
//! delivery fan-out; it is rebuilt as connections rejoin and never consulted
//! for authorization. Participancy checks stay with the services.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod message_types;

/// Unique identifier for one room subscription of one connection.
///
/// A connection joined to several rooms holds one subscriber id per room,
/// which allows precise cleanup when it leaves a room or drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

/// Tracks which connections are joined to which conversation rooms.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // conversation_id -> subscribers
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to a conversation room.
    ///
    /// Returns the subscription id (used for cleanup) and the channel on
    /// which this subscriber receives fan-out payloads.
    pub async fn add_subscriber(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard.entry(conversation_id).or_default().push(Subscriber {
            id: subscriber_id,
            user_id,
            sender: tx,
        });

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            subscribers = guard.get(&conversation_id).map(|v| v.len()).unwrap_or(0),
            "subscriber joined room"
        );

        (subscriber_id, rx)
    }

    /// Remove one subscription from a room. Idempotent; must run when a
    /// connection leaves a room or closes, or the entry leaks.
    pub async fn remove_subscriber(&self, conversation_id: Uuid, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&conversation_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    /// Deliver a payload to every subscriber in the room. Dead senders are
    /// dropped from the room as a side effect.
    pub async fn broadcast(&self, conversation_id: Uuid, payload: String) {
        self.broadcast_filtered(conversation_id, payload, None).await;
    }

    /// Deliver a payload to every subscriber in the room except one
    /// (typing indicators skip the originating connection).
    pub async fn broadcast_except(
        &self,
        conversation_id: Uuid,
        except: SubscriberId,
        payload: String,
    ) {
        self.broadcast_filtered(conversation_id, payload, Some(except))
            .await;
    }

    async fn broadcast_filtered(
        &self,
        conversation_id: Uuid,
        payload: String,
        except: Option<SubscriberId>,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(&conversation_id) {
            subscribers.retain(|subscriber| {
                if Some(subscriber.id) == except {
                    return true;
                }
                subscriber.sender.send(payload.clone()).is_ok()
            });
            if subscribers.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&conversation_id).map(|v| v.len()).unwrap_or(0)
    }
}
