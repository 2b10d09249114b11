use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Dm,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Dm => "dm",
            ConversationKind::Group => "group",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "dm" => Some(ConversationKind::Dm),
            "group" => Some(ConversationKind::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Member,
    Admin,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Member => "member",
            ParticipantRole::Admin => "admin",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "member" => Some(ParticipantRole::Member),
            "admin" => Some(ParticipantRole::Admin),
            _ => None,
        }
    }
}

/// Membership record embedded in a conversation.
///
/// `user_name` and `user_avatar` are snapshots taken when the participant was
/// added; a later profile rename does not rewrite them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub role: ParticipantRole,
    pub last_read_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

/// Denormalized summary of the newest message, kept on the conversation for
/// list-view rendering without a second query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    /// Group-only; `None` for DMs.
    pub name: Option<String>,
    pub description: Option<String>,
    /// Back-reference to the originating volunteer event, group chats only.
    pub event_id: Option<Uuid>,
    pub participants: Vec<Participant>,
    pub last_message: Option<LastMessage>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.participant(user_id)
            .map(|p| p.role == ParticipantRole::Admin)
            .unwrap_or(false)
    }
}

/// Canonical key for the unordered DM participant pair. Both argument orders
/// produce the same key, which backs the active-DM uniqueness constraint.
pub fn dm_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dm_key(a, b), dm_key(b, a));
        assert_ne!(dm_key(a, b), dm_key(a, a));
    }

    #[test]
    fn role_round_trips_through_db_strings() {
        for role in [ParticipantRole::Member, ParticipantRole::Admin] {
            assert_eq!(ParticipantRole::from_db(role.as_str()), Some(role));
        }
        assert_eq!(ParticipantRole::from_db("owner"), None);
    }
}
