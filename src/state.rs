use std::sync::Arc;

use crate::config::Config;
use crate::services::{ConversationService, MessageService};
use crate::store::ChatStore;
use crate::websocket::ConnectionRegistry;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub conversations: ConversationService,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        messages: MessageService,
    ) -> Self {
        Self {
            config,
            store,
            registry: ConnectionRegistry::new(),
            conversations,
            messages,
        }
    }
}
