//! Fire-and-forget push-notification sink.
//!
//! The core hands delivery requests to the notification service and never
//! waits on or reacts to the outcome; failures are logged and dropped.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    MessageReceived {
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        preview: String,
    },
    AddedToGroup {
        conversation_id: Uuid,
        group_name: String,
        added_by: Uuid,
    },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, recipient: Uuid, event: NotificationEvent);
}

pub struct HttpNotificationSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn notify(&self, recipient: Uuid, event: NotificationEvent) {
        let url = format!("{}/internal/v1/notifications/{}", self.base_url, recipient);
        if let Err(e) = self.client.post(&url).json(&event).send().await {
            tracing::warn!(recipient = %recipient, error = %e, "notification delivery failed");
        }
    }
}
