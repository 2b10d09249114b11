//! Persistence seam for conversations and messages.
//!
//! The services talk to a `ChatStore` trait object. `PostgresChatStore` is
//! the production implementation; `MemoryChatStore` serves local development
//! (`CHAT_STORE=memory`) and the test suite. Both enforce the same contract:
//! at most one active DM per unordered user pair, and an atomic
//! add-if-absent/remove-if-present reaction toggle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, LastMessage, Message, Participant, ParticipantRole};

pub mod memory;
pub mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PostgresChatStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a new conversation with its initial participants.
    ///
    /// Fails with `Conflict` when an active DM already exists for the same
    /// unordered participant pair; callers resolve the race by re-reading.
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Look up the active DM between two users, in either argument order.
    async fn find_dm(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Option<Conversation>>;

    /// All active conversations the user participates in, most recently
    /// updated first. Unpaginated; pagination belongs to message history.
    async fn list_conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
    ) -> AppResult<()>;

    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()>;

    async fn set_participant_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> AppResult<()>;

    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        summary: &LastMessage,
    ) -> AppResult<()>;

    async fn set_last_read_at(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn insert_message(&self, message: &Message) -> AppResult<()>;

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Page of messages in authoritative order, newest first, together with
    /// the total count of non-deleted messages in the conversation.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Message>, i64)>;

    async fn update_message_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Flag the message deleted and overwrite its content with the fixed
    /// placeholder. The original content is not recoverable.
    async fn soft_delete_message(&self, id: Uuid) -> AppResult<()>;

    /// Idempotently add a read receipt for each listed message.
    async fn mark_messages_read(
        &self,
        message_ids: &[Uuid],
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Atomically toggle a `(user, emoji)` reaction. Returns `true` when the
    /// reaction was added, `false` when an existing one was removed.
    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        emoji: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Messages in the conversation not authored by the user and not present
    /// in the user's read receipts.
    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64>;
}
