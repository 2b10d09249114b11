use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::dm_key;
use crate::models::message::DELETED_MESSAGE_PLACEHOLDER;
use crate::models::{
    Conversation, ConversationKind, LastMessage, Message, Participant, ParticipantRole, Reaction,
    ReadReceipt,
};
use crate::store::ChatStore;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    /// dm_key -> conversation id, active DMs only.
    dm_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, Message>,
    /// Persistence order per conversation; the authoritative message order.
    message_log: HashMap<Uuid, Vec<Uuid>>,
}

/// In-process `ChatStore` used by local development (`CHAT_STORE=memory`) and
/// the test suite. All mutations happen under one write lock, which gives the
/// same atomicity the Postgres implementation gets from single statements.
#[derive(Default)]
pub struct MemoryChatStore {
    inner: RwLock<Inner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        if conversation.kind == ConversationKind::Dm {
            let mut ids = conversation.participants.iter().map(|p| p.user_id);
            let key = match (ids.next(), ids.next()) {
                (Some(a), Some(b)) => dm_key(a, b),
                _ => {
                    return Err(AppError::Validation(
                        "a DM requires exactly two participants".into(),
                    ))
                }
            };
            // Uniqueness only covers active DMs; an inactive row neither
            // blocks nor claims the pair.
            if conversation.is_active {
                let occupied = inner
                    .dm_index
                    .get(&key)
                    .and_then(|id| inner.conversations.get(id))
                    .map(|c| c.is_active)
                    .unwrap_or(false);
                if occupied {
                    return Err(AppError::Conflict(
                        "an active DM already exists for this user pair".into(),
                    ));
                }
                inner.dm_index.insert(key, conversation.id);
            }
        }

        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        inner.message_log.entry(conversation.id).or_default();
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn find_dm(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.read().await;
        let id = inner.dm_index.get(&dm_key(user_a, user_b));
        Ok(id
            .and_then(|id| inner.conversations.get(id))
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn list_conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.is_active && c.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;

        if conversation.is_participant(participant.user_id) {
            return Err(AppError::Conflict("already a participant".into()));
        }
        conversation.participants.push(participant.clone());
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;

        let before = conversation.participants.len();
        conversation.participants.retain(|p| p.user_id != user_id);
        if conversation.participants.len() == before {
            return Err(AppError::NotFound("participant"));
        }
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_participant_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;
        let participant = conversation
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(AppError::NotFound("participant"))?;
        participant.role = role;
        Ok(())
    }

    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        summary: &LastMessage,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;
        conversation.last_message = Some(summary.clone());
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_last_read_at(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;
        if let Some(participant) = conversation
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
        {
            participant.last_read_at = Some(read_at);
        }
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .message_log
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        let inner = self.inner.read().await;
        let log = inner
            .message_log
            .get(&conversation_id)
            .map(|v| v.as_slice())
            .unwrap_or_default();

        let total = log
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .filter(|m| !m.is_deleted)
            .count() as i64;

        let page: Vec<Message> = log
            .iter()
            .rev() // newest first
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|id| inner.messages.get(id))
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn update_message_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&id)
            .ok_or(AppError::NotFound("message"))?;
        message.content = content.to_string();
        message.is_edited = true;
        message.edited_at = Some(edited_at);
        Ok(())
    }

    async fn soft_delete_message(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&id)
            .ok_or(AppError::NotFound("message"))?;
        message.is_deleted = true;
        message.content = DELETED_MESSAGE_PLACEHOLDER.to_string();
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        message_ids: &[Uuid],
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        for id in message_ids {
            if let Some(message) = inner.messages.get_mut(id) {
                if !message.is_read_by(user_id) {
                    message.read_by.push(ReadReceipt { user_id, read_at });
                }
            }
        }
        Ok(())
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        emoji: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound("message"))?;

        let before = message.reactions.len();
        message
            .reactions
            .retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        if message.reactions.len() < before {
            return Ok(false);
        }

        message.reactions.push(Reaction {
            user_id,
            user_name: user_name.to_string(),
            emoji: emoji.to_string(),
            created_at: at,
        });
        Ok(true)
    }

    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.read().await;
        let log = inner
            .message_log
            .get(&conversation_id)
            .map(|v| v.as_slice())
            .unwrap_or_default();

        let count = log
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .filter(|m| m.sender_id != user_id && !m.is_read_by(user_id))
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    fn participant(user_id: Uuid) -> Participant {
        Participant {
            user_id,
            user_name: "Ana".into(),
            user_avatar: None,
            role: ParticipantRole::Member,
            last_read_at: None,
            joined_at: Utc::now(),
        }
    }

    fn conversation(kind: ConversationKind, members: &[Uuid], is_active: bool) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            kind,
            name: None,
            description: None,
            event_id: None,
            participants: members.iter().copied().map(participant).collect(),
            last_message: None,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(conversation_id: Uuid, sender_id: Uuid, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            sender_name: "Ana".into(),
            sender_avatar: None,
            content: content.into(),
            kind: MessageKind::Text,
            reply_to: None,
            is_edited: false,
            is_deleted: false,
            read_by: Vec::new(),
            reactions: Vec::new(),
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    #[tokio::test]
    async fn find_dm_only_sees_active_conversations() {
        let store = MemoryChatStore::new();
        let ana = Uuid::new_v4();
        let bela = Uuid::new_v4();

        let inactive = conversation(ConversationKind::Dm, &[ana, bela], false);
        store.insert_conversation(&inactive).await.unwrap();
        assert!(store.find_dm(ana, bela).await.unwrap().is_none());

        // An inactive row neither claims nor blocks the pair.
        let active = conversation(ConversationKind::Dm, &[ana, bela], true);
        store.insert_conversation(&active).await.unwrap();
        let found = store.find_dm(bela, ana).await.unwrap().unwrap();
        assert_eq!(found.id, active.id);

        let duplicate = conversation(ConversationKind::Dm, &[ana, bela], true);
        let err = store.insert_conversation(&duplicate).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn conversation_listing_is_unpaginated() {
        let store = MemoryChatStore::new();
        let ana = Uuid::new_v4();

        for _ in 0..120 {
            let group = conversation(ConversationKind::Group, &[ana, Uuid::new_v4()], true);
            store.insert_conversation(&group).await.unwrap();
        }

        let listed = store.list_conversations_for_user(ana).await.unwrap();
        assert_eq!(listed.len(), 120);
    }

    #[tokio::test]
    async fn toggle_reaction_is_an_involution() {
        let store = MemoryChatStore::new();
        let conversation_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let msg = message(conversation_id, Uuid::new_v4(), "hi");
        store.insert_message(&msg).await.unwrap();

        let added = store
            .toggle_reaction(msg.id, user, "Ana", "👍", Utc::now())
            .await
            .unwrap();
        assert!(added);

        let removed = store
            .toggle_reaction(msg.id, user, "Ana", "👍", Utc::now())
            .await
            .unwrap();
        assert!(!removed);

        let stored = store.get_message(msg.id).await.unwrap().unwrap();
        assert!(!stored.has_reaction(user, "👍"));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let store = MemoryChatStore::new();
        let conversation_id = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let msg = message(conversation_id, Uuid::new_v4(), "hi");
        store.insert_message(&msg).await.unwrap();

        store
            .mark_messages_read(&[msg.id], reader, Utc::now())
            .await
            .unwrap();
        store
            .mark_messages_read(&[msg.id], reader, Utc::now())
            .await
            .unwrap();

        let stored = store.get_message(msg.id).await.unwrap().unwrap();
        assert_eq!(stored.read_by.len(), 1);
        assert_eq!(store.unread_count(conversation_id, reader).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_messages_pages_newest_first_and_counts_non_deleted() {
        let store = MemoryChatStore::new();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..5 {
            let msg = message(conversation_id, sender, &format!("m{i}"));
            ids.push(msg.id);
            store.insert_message(&msg).await.unwrap();
        }
        store.soft_delete_message(ids[0]).await.unwrap();

        let (page, total) = store.list_messages(conversation_id, 0, 2).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "m4");
        assert_eq!(page[1].content, "m3");
    }
}
