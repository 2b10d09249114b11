use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::dm_key;
use crate::models::{
    Conversation, ConversationKind, LastMessage, Message, MessageKind, Participant,
    ParticipantRole, Reaction, ReadReceipt,
};
use crate::store::ChatStore;

pub struct PostgresChatStore {
    pool: Pool,
}

impl PostgresChatStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn conversation_from_row(row: &Row) -> AppResult<Conversation> {
        let kind_str: String = row.get("kind");
        let kind = ConversationKind::from_db(&kind_str)
            .ok_or_else(|| AppError::Database(format!("unknown conversation kind: {kind_str}")))?;

        let last_message: Option<serde_json::Value> = row.get("last_message");
        let last_message = match last_message {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| AppError::Database(format!("decode last_message: {e}")))?,
            ),
            None => None,
        };

        Ok(Conversation {
            id: row.get("id"),
            kind,
            name: row.get("name"),
            description: row.get("description"),
            event_id: row.get("event_id"),
            participants: Vec::new(),
            last_message,
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn participant_from_row(row: &Row) -> AppResult<Participant> {
        let role_str: String = row.get("role");
        let role = ParticipantRole::from_db(&role_str)
            .ok_or_else(|| AppError::Database(format!("unknown participant role: {role_str}")))?;

        Ok(Participant {
            user_id: row.get("user_id"),
            user_name: row.get("user_name"),
            user_avatar: row.get("user_avatar"),
            role,
            last_read_at: row.get("last_read_at"),
            joined_at: row.get("joined_at"),
        })
    }

    fn message_from_row(row: &Row) -> AppResult<Message> {
        let kind_str: String = row.get("kind");
        let kind = MessageKind::from_db(&kind_str)
            .ok_or_else(|| AppError::Database(format!("unknown message kind: {kind_str}")))?;

        Ok(Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            sender_name: row.get("sender_name"),
            sender_avatar: row.get("sender_avatar"),
            content: row.get("content"),
            kind,
            reply_to: row.get("reply_to"),
            is_edited: row.get("is_edited"),
            is_deleted: row.get("is_deleted"),
            read_by: Vec::new(),
            reactions: Vec::new(),
            created_at: row.get("created_at"),
            edited_at: row.get("edited_at"),
        })
    }

    /// Attach participants to already-fetched conversations in one query.
    async fn hydrate_participants(
        &self,
        conversations: &mut [Conversation],
    ) -> AppResult<()> {
        if conversations.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT conversation_id, user_id, user_name, user_avatar, role, last_read_at, joined_at
                FROM conversation_participants
                WHERE conversation_id = ANY($1)
                ORDER BY joined_at ASC
                "#,
                &[&ids],
            )
            .await?;

        let mut by_conversation: HashMap<Uuid, Vec<Participant>> = HashMap::new();
        for row in rows {
            let conversation_id: Uuid = row.get("conversation_id");
            by_conversation
                .entry(conversation_id)
                .or_default()
                .push(Self::participant_from_row(&row)?);
        }

        for conversation in conversations.iter_mut() {
            conversation.participants =
                by_conversation.remove(&conversation.id).unwrap_or_default();
        }
        Ok(())
    }

    /// Attach read receipts and reactions to already-fetched messages.
    async fn hydrate_messages(&self, messages: &mut [Message]) -> AppResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let client = self.pool.get().await?;

        let read_rows = client
            .query(
                "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id = ANY($1)",
                &[&ids],
            )
            .await?;

        let mut reads: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
        for row in read_rows {
            let message_id: Uuid = row.get("message_id");
            reads.entry(message_id).or_default().push(ReadReceipt {
                user_id: row.get("user_id"),
                read_at: row.get("read_at"),
            });
        }

        let reaction_rows = client
            .query(
                r#"
                SELECT message_id, user_id, user_name, emoji, created_at
                FROM message_reactions
                WHERE message_id = ANY($1)
                ORDER BY created_at ASC
                "#,
                &[&ids],
            )
            .await?;

        let mut reactions: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for row in reaction_rows {
            let message_id: Uuid = row.get("message_id");
            reactions.entry(message_id).or_default().push(Reaction {
                user_id: row.get("user_id"),
                user_name: row.get("user_name"),
                emoji: row.get("emoji"),
                created_at: row.get("created_at"),
            });
        }

        for message in messages.iter_mut() {
            message.read_by = reads.remove(&message.id).unwrap_or_default();
            message.reactions = reactions.remove(&message.id).unwrap_or_default();
        }
        Ok(())
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, kind, name, description, event_id, last_message, is_active, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_name, sender_avatar, \
     content, kind, reply_to, is_edited, is_deleted, created_at, edited_at";

#[async_trait]
impl ChatStore for PostgresChatStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let key = match conversation.kind {
            ConversationKind::Dm => {
                let mut ids = conversation.participants.iter().map(|p| p.user_id);
                match (ids.next(), ids.next()) {
                    (Some(a), Some(b)) => Some(dm_key(a, b)),
                    _ => {
                        return Err(AppError::Validation(
                            "a DM requires exactly two participants".into(),
                        ))
                    }
                }
            }
            ConversationKind::Group => None,
        };

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let inserted = tx
            .execute(
                r#"
                INSERT INTO conversations
                    (id, kind, name, description, event_id, dm_key, last_message, is_active, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
                &[
                    &conversation.id,
                    &conversation.kind.as_str(),
                    &conversation.name,
                    &conversation.description,
                    &conversation.event_id,
                    &key,
                    &conversation
                        .last_message
                        .as_ref()
                        .map(serde_json::to_value)
                        .transpose()
                        .map_err(|e| AppError::Database(format!("encode last_message: {e}")))?,
                    &conversation.is_active,
                    &conversation.created_at,
                    &conversation.updated_at,
                ],
            )
            .await;

        if let Err(e) = inserted {
            // The partial unique index on dm_key catches concurrent
            // duplicate DM creation.
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                return Err(AppError::Conflict(
                    "an active DM already exists for this user pair".into(),
                ));
            }
            return Err(e.into());
        }

        for participant in &conversation.participants {
            tx.execute(
                r#"
                INSERT INTO conversation_participants
                    (conversation_id, user_id, user_name, user_avatar, role, last_read_at, joined_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &conversation.id,
                    &participant.user_id,
                    &participant.user_name,
                    &participant.user_avatar,
                    &participant.role.as_str(),
                    &participant.last_read_at,
                    &participant.joined_at,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"),
                &[&id],
            )
            .await?;

        let Some(row) = row else { return Ok(None) };
        let mut conversations = vec![Self::conversation_from_row(&row)?];
        self.hydrate_participants(&mut conversations).await?;
        Ok(conversations.pop())
    }

    async fn find_dm(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Option<Conversation>> {
        let key = dm_key(user_a, user_b);
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE kind = 'dm' AND is_active AND dm_key = $1"
                ),
                &[&key],
            )
            .await?;

        let Some(row) = row else { return Ok(None) };
        let mut conversations = vec![Self::conversation_from_row(&row)?];
        self.hydrate_participants(&mut conversations).await?;
        Ok(conversations.pop())
    }

    async fn list_conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {CONVERSATION_COLUMNS}
                    FROM conversations c
                    JOIN conversation_participants cp ON cp.conversation_id = c.id
                    WHERE cp.user_id = $1 AND c.is_active
                    ORDER BY c.updated_at DESC
                    "#
                ),
                &[&user_id],
            )
            .await?;
        drop(client);

        let mut conversations = rows
            .iter()
            .map(Self::conversation_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        self.hydrate_participants(&mut conversations).await?;
        Ok(conversations)
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
    ) -> AppResult<()> {
        let client = self.pool.get().await?;
        let result = client
            .execute(
                r#"
                INSERT INTO conversation_participants
                    (conversation_id, user_id, user_name, user_avatar, role, last_read_at, joined_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &conversation_id,
                    &participant.user_id,
                    &participant.user_name,
                    &participant.user_avatar,
                    &participant.role.as_str(),
                    &participant.last_read_at,
                    &participant.joined_at,
                ],
            )
            .await;

        if let Err(e) = result {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                return Err(AppError::Conflict("already a participant".into()));
            }
            return Err(e.into());
        }

        client
            .execute(
                "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
                &[&conversation_id],
            )
            .await?;
        Ok(())
    }

    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let client = self.pool.get().await?;
        let removed = client
            .execute(
                "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &user_id],
            )
            .await?;
        if removed == 0 {
            return Err(AppError::NotFound("participant"));
        }

        client
            .execute(
                "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
                &[&conversation_id],
            )
            .await?;
        Ok(())
    }

    async fn set_participant_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> AppResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE conversation_participants SET role = $3 \
                 WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &user_id, &role.as_str()],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("participant"));
        }
        Ok(())
    }

    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        summary: &LastMessage,
    ) -> AppResult<()> {
        let value = serde_json::to_value(summary)
            .map_err(|e| AppError::Database(format!("encode last_message: {e}")))?;
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE conversations SET last_message = $2, updated_at = NOW() WHERE id = $1",
                &[&conversation_id, &value],
            )
            .await?;
        Ok(())
    }

    async fn set_last_read_at(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE conversation_participants SET last_read_at = $3 \
                 WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &user_id, &read_at],
            )
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO messages
                    (id, conversation_id, sender_id, sender_name, sender_avatar,
                     content, kind, reply_to, is_edited, is_deleted, created_at, edited_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
                &[
                    &message.id,
                    &message.conversation_id,
                    &message.sender_id,
                    &message.sender_name,
                    &message.sender_avatar,
                    &message.content,
                    &message.kind.as_str(),
                    &message.reply_to,
                    &message.is_edited,
                    &message.is_deleted,
                    &message.created_at,
                    &message.edited_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"),
                &[&id],
            )
            .await?;
        drop(client);

        let Some(row) = row else { return Ok(None) };
        let mut messages = vec![Self::message_from_row(&row)?];
        self.hydrate_messages(&mut messages).await?;
        Ok(messages.pop())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        let client = self.pool.get().await?;

        let total: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM messages \
                 WHERE conversation_id = $1 AND NOT is_deleted",
                &[&conversation_id],
            )
            .await?
            .get(0);

        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2 OFFSET $3"
                ),
                &[&conversation_id, &limit, &offset],
            )
            .await?;
        drop(client);

        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        self.hydrate_messages(&mut messages).await?;
        Ok((messages, total))
    }

    async fn update_message_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET content = $2, is_edited = TRUE, edited_at = $3 WHERE id = $1",
                &[&id, &content, &edited_at],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("message"));
        }
        Ok(())
    }

    async fn soft_delete_message(&self, id: Uuid) -> AppResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET is_deleted = TRUE, content = $2 WHERE id = $1",
                &[&id, &crate::models::message::DELETED_MESSAGE_PLACEHOLDER],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("message"));
        }
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        message_ids: &[Uuid],
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let ids = message_ids.to_vec();
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO message_reads (message_id, user_id, read_at)
                SELECT m.id, $2, $3 FROM messages m WHERE m.id = ANY($1)
                ON CONFLICT (message_id, user_id) DO NOTHING
                "#,
                &[&ids, &user_id, &read_at],
            )
            .await?;
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
        // Single statement: remove-if-present, otherwise insert. Concurrent
        // toggles for the same (user, emoji) cannot race into a lost update.
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                WITH removed AS (
                    DELETE FROM message_reactions
                    WHERE message_id = $1 AND user_id = $2 AND emoji = $3
                    RETURNING 1
                )
                INSERT INTO message_reactions (message_id, user_id, user_name, emoji, created_at)
                SELECT $1, $2, $4, $3, $5
                WHERE NOT EXISTS (SELECT 1 FROM removed)
                "#,
                &[&message_id, &user_id, &emoji, &user_name, &at],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let client = self.pool.get().await?;
        let count: i64 = client
            .query_one(
                r#"
                SELECT COUNT(*) FROM messages m
                WHERE m.conversation_id = $1
                  AND m.sender_id <> $2
                  AND NOT EXISTS (
                      SELECT 1 FROM message_reads r
                      WHERE r.message_id = m.id AND r.user_id = $2
                  )
                "#,
                &[&conversation_id, &user_id],
            )
            .await?
            .get(0);
        Ok(count)
    }
}
