use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content shown in place of a deleted message. The original content is
/// overwritten in the store and unrecoverable through this service.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub user_name: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// A single message in a conversation.
///
/// Sender name/avatar are denormalized at send time from the conversation's
/// participant record and never updated retroactively. Ordering within a
/// conversation is by server-assigned `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to: Option<Uuid>,
    pub is_edited: bool,
    pub is_deleted: bool,
    /// Monotonically grows; a user appears at most once.
    pub read_by: Vec<ReadReceipt>,
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    pub fn has_reaction(&self, user_id: Uuid, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
    }
}
