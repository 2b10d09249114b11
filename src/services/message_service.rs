//! Message persistence and mutation.
//!
//! Every operation authorizes against the owning conversation's participant
//! list before touching the message log. Sender display data is snapshotted
//! from the participant record at send time.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, LastMessage, Message, MessageKind, ReadReceipt};
use crate::services::notifications::{NotificationEvent, NotificationSink};
use crate::services::profiles::ProfileDirectory;
use crate::store::ChatStore;

const MAX_PAGE_SIZE: i64 = 100;
const NOTIFICATION_PREVIEW_CHARS: usize = 80;

/// One page of conversation history, oldest first for display.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Total non-deleted messages in the conversation.
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn NotificationSink>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        profiles: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            profiles,
            notifier,
        }
    }

    async fn active_conversation_for(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    /// Persist a new message and update the conversation's last-message
    /// summary. Returns the created message.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        kind: Option<MessageKind>,
        reply_to: Option<Uuid>,
    ) -> AppResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("message content cannot be empty".into()));
        }

        let conversation = self.active_conversation_for(conversation_id, sender_id).await?;
        // Participant existence checked above; snapshot display data.
        let sender = conversation
            .participant(sender_id)
            .ok_or(AppError::Forbidden)?;

        if let Some(reply_id) = reply_to {
            let target = self
                .store
                .get_message(reply_id)
                .await?
                .ok_or(AppError::NotFound("message"))?;
            if target.conversation_id != conversation_id {
                return Err(AppError::Validation(
                    "reply target belongs to another conversation".into(),
                ));
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            sender_name: sender.user_name.clone(),
            sender_avatar: sender.user_avatar.clone(),
            content: content.to_string(),
            kind: kind.unwrap_or(MessageKind::Text),
            reply_to,
            is_edited: false,
            is_deleted: false,
            read_by: Vec::new(),
            reactions: Vec::new(),
            created_at: Utc::now(),
            edited_at: None,
        };

        self.store.insert_message(&message).await?;
        self.store
            .set_last_message(
                conversation_id,
                &LastMessage {
                    content: message.content.clone(),
                    sender_id,
                    sender_name: message.sender_name.clone(),
                    timestamp: message.created_at,
                },
            )
            .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "message persisted"
        );

        self.notify_recipients(&conversation, &message);
        Ok(message)
    }

    /// Fetch one page of history, oldest first.
    ///
    /// This is a mutating read: every returned message not authored by the
    /// requester is marked read, and the requester's `last_read_at` marker on
    /// the conversation advances to now. Callers rely on this conflation.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<MessagePage> {
        if page < 1 {
            return Err(AppError::Validation("page starts at 1".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        self.active_conversation_for(conversation_id, requester_id).await?;

        let offset = (page - 1) * page_size;
        let (mut messages, total) = self
            .store
            .list_messages(conversation_id, offset, page_size)
            .await?;

        let now = Utc::now();
        let unread_ids: Vec<Uuid> = messages
            .iter()
            .filter(|m| m.sender_id != requester_id && !m.is_read_by(requester_id))
            .map(|m| m.id)
            .collect();
        if !unread_ids.is_empty() {
            self.store
                .mark_messages_read(&unread_ids, requester_id, now)
                .await?;
            for message in messages.iter_mut() {
                if unread_ids.contains(&message.id) {
                    message.read_by.push(ReadReceipt {
                        user_id: requester_id,
                        read_at: now,
                    });
                }
            }
        }
        self.store
            .set_last_read_at(conversation_id, requester_id, now)
            .await?;

        // Paginated newest-first, displayed oldest-first.
        messages.reverse();
        Ok(MessagePage {
            messages,
            total,
            page,
            page_size,
        })
    }

    /// Edit a message's content. Sender-only; deleted messages cannot be edited.
    pub async fn edit(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
        new_content: &str,
    ) -> AppResult<Message> {
        let new_content = new_content.trim();
        if new_content.is_empty() {
            return Err(AppError::Validation("message content cannot be empty".into()));
        }

        let mut message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Err(AppError::InvalidOperation(
                "a deleted message cannot be edited".into(),
            ));
        }

        let edited_at = Utc::now();
        self.store
            .update_message_content(message_id, new_content, edited_at)
            .await?;

        message.content = new_content.to_string();
        message.is_edited = true;
        message.edited_at = Some(edited_at);
        Ok(message)
    }

    /// Soft-delete a message: the deleted flag is set and the content is
    /// replaced with a fixed placeholder. Sender-only; idempotent.
    pub async fn delete(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<()> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Ok(());
        }
        self.store.soft_delete_message(message_id).await
    }

    /// Toggle the `(user, emoji)` reaction on a message: present is removed,
    /// absent is added with the user's current display name.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> AppResult<Message> {
        if emoji.is_empty() || emoji.len() > 20 {
            return Err(AppError::Validation("invalid emoji".into()));
        }

        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        if message.is_deleted {
            return Err(AppError::InvalidOperation(
                "cannot react to a deleted message".into(),
            ));
        }
        self.active_conversation_for(message.conversation_id, user_id).await?;

        let profile = self.profiles.resolve(user_id).await?;
        self.store
            .toggle_reaction(message_id, user_id, &profile.name, emoji, Utc::now())
            .await?;

        self.store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    /// Messages in the conversation not authored by the user and not yet read.
    pub async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        self.store.unread_count(conversation_id, user_id).await
    }

    /// Unread count in the DM with one specific user; 0 when no DM exists.
    pub async fn unread_count_with_user(
        &self,
        requester_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<i64> {
        match self.store.find_dm(requester_id, other_user_id).await? {
            Some(dm) => self.store.unread_count(dm.id, requester_id).await,
            None => Ok(0),
        }
    }

    fn notify_recipients(&self, conversation: &Conversation, message: &Message) {
        let recipients: Vec<Uuid> = conversation
            .participants
            .iter()
            .map(|p| p.user_id)
            .filter(|id| *id != message.sender_id)
            .collect();

        let preview: String = message
            .content
            .chars()
            .take(NOTIFICATION_PREVIEW_CHARS)
            .collect();
        let event = NotificationEvent::MessageReceived {
            conversation_id: conversation.id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            preview,
        };

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            for recipient in recipients {
                notifier.notify(recipient, event.clone()).await;
            }
        });
    }
}
