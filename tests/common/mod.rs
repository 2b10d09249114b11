//! Shared fixtures: an in-memory store wired to static profile data and a
//! recording notification sink.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use chat_service::error::{AppError, AppResult};
use chat_service::services::{
    ConversationService, MessageService, NotificationEvent, NotificationSink, ProfileDirectory,
    UserProfile,
};
use chat_service::store::MemoryChatStore;

pub struct StaticProfiles {
    profiles: HashMap<Uuid, UserProfile>,
}

impl StaticProfiles {
    pub fn new(entries: &[(Uuid, &str)]) -> Self {
        let profiles = entries
            .iter()
            .map(|(id, name)| {
                (
                    *id,
                    UserProfile {
                        id: *id,
                        name: name.to_string(),
                        avatar_url: None,
                    },
                )
            })
            .collect();
        Self { profiles }
    }
}

#[async_trait]
impl ProfileDirectory for StaticProfiles {
    async fn resolve(&self, user_id: Uuid) -> AppResult<UserProfile> {
        self.profiles
            .get(&user_id)
            .cloned()
            .ok_or(AppError::NotFound("user"))
    }
}

/// Records every delivery request instead of calling out over HTTP.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(Uuid, NotificationEvent)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, recipient: Uuid, event: NotificationEvent) {
        self.events.lock().await.push((recipient, event));
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryChatStore>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub sink: Arc<RecordingSink>,
}

pub fn env_with_users(entries: &[(Uuid, &str)]) -> TestEnv {
    let store = Arc::new(MemoryChatStore::new());
    let profiles = Arc::new(StaticProfiles::new(entries));
    let sink = Arc::new(RecordingSink::default());

    let conversations =
        ConversationService::new(store.clone(), profiles.clone(), sink.clone());
    let messages = MessageService::new(store.clone(), profiles, sink.clone());

    TestEnv {
        store,
        conversations,
        messages,
        sink,
    }
}
