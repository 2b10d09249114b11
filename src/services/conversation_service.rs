//! Conversation lifecycle and membership.
//!
//! DMs are deduplicated by unordered participant pair (find-or-create, backed
//! by a store-level uniqueness constraint). Groups carry roles; only admins
//! manage membership.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationKind, Participant, ParticipantRole,
};
use crate::services::notifications::{NotificationEvent, NotificationSink};
use crate::services::profiles::{ProfileDirectory, UserProfile};
use crate::store::ChatStore;

/// Conversation annotated with the requesting user's unread message count,
/// as rendered in the conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn NotificationSink>,
}

impl ConversationService {
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

    fn participant_from_profile(profile: &UserProfile, role: ParticipantRole) -> Participant {
        Participant {
            user_id: profile.id,
            user_name: profile.name.clone(),
            user_avatar: profile.avatar_url.clone(),
            role,
            last_read_at: None,
            joined_at: Utc::now(),
        }
    }

    /// Return the active DM between the two users, creating it when absent.
    /// Idempotent: both argument orders resolve to the same conversation.
    pub async fn find_or_create_dm(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Conversation> {
        if user_a == user_b {
            return Err(AppError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let profile_a = self.profiles.resolve(user_a).await?;
        let profile_b = self.profiles.resolve(user_b).await?;

        if let Some(existing) = self.store.find_dm(user_a, user_b).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Dm,
            name: None,
            description: None,
            event_id: None,
            participants: vec![
                Self::participant_from_profile(&profile_a, ParticipantRole::Member),
                Self::participant_from_profile(&profile_b, ParticipantRole::Member),
            ],
            last_message: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_conversation(&conversation).await {
            Ok(()) => {
                tracing::info!(conversation_id = %conversation.id, "created DM conversation");
                Ok(conversation)
            }
            // Lost a concurrent create for the same pair: return the winner.
            Err(AppError::Conflict(_)) => self
                .store
                .find_dm(user_a, user_b)
                .await?
                .ok_or(AppError::Internal),
            Err(e) => Err(e),
        }
    }

    /// Create a group conversation. The creator becomes the sole admin;
    /// everyone else joins as a member.
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        name: &str,
        participant_ids: &[Uuid],
        description: Option<String>,
        event_id: Option<Uuid>,
    ) -> AppResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("group name cannot be empty".into()));
        }
        if participant_ids.is_empty() {
            return Err(AppError::Validation(
                "a group needs at least one participant".into(),
            ));
        }

        let creator = self.profiles.resolve(creator_id).await?;
        let mut participants = vec![Self::participant_from_profile(
            &creator,
            ParticipantRole::Admin,
        )];
        for &user_id in participant_ids {
            if user_id == creator_id || participants.iter().any(|p| p.user_id == user_id) {
                continue;
            }
            let profile = self.profiles.resolve(user_id).await?;
            participants.push(Self::participant_from_profile(
                &profile,
                ParticipantRole::Member,
            ));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            name: Some(name.to_string()),
            description,
            event_id,
            participants,
            last_message: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_conversation(&conversation).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            participants = conversation.participants.len(),
            "created group conversation"
        );

        let recipients: Vec<Uuid> = conversation
            .participants
            .iter()
            .map(|p| p.user_id)
            .filter(|id| *id != creator_id)
            .collect();
        self.notify_added(&conversation, creator_id, recipients);

        Ok(conversation)
    }

    /// Fetch a conversation on behalf of a participant.
    ///
    /// Unknown or inactive ids fail with `NotFound`; a known conversation the
    /// requester does not belong to fails with `Forbidden`.
    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.is_participant(requester_id) {
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    /// Active conversations for the user, newest activity first, each with
    /// the user's unread count.
    pub async fn list_user_conversations(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.store.list_conversations_for_user(user_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unread_count = self.store.unread_count(conversation.id, user_id).await?;
            summaries.push(ConversationSummary {
                conversation,
                unread_count,
            });
        }
        Ok(summaries)
    }

    /// Add a member to a group conversation. Requires the requester to hold
    /// the admin role.
    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
        new_user_id: Uuid,
    ) -> AppResult<Participant> {
        let conversation = self.get_conversation(conversation_id, requester_id).await?;

        if conversation.kind != ConversationKind::Group {
            return Err(AppError::InvalidOperation(
                "participants can only be added to group conversations".into(),
            ));
        }
        if !conversation.is_admin(requester_id) {
            return Err(AppError::Forbidden);
        }
        if conversation.is_participant(new_user_id) {
            return Err(AppError::Conflict("already a participant".into()));
        }

        let profile = self.profiles.resolve(new_user_id).await?;
        let participant = Self::participant_from_profile(&profile, ParticipantRole::Member);
        self.store
            .add_participant(conversation_id, &participant)
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            user_id = %new_user_id,
            "participant added"
        );

        self.notify_added(&conversation, requester_id, vec![new_user_id]);
        Ok(participant)
    }

    /// Leave a group conversation. DMs cannot be left.
    ///
    /// When the last admin leaves, the earliest-joined remaining participant
    /// is promoted so the group never ends up admin-less.
    pub async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound("conversation"))?;

        if conversation.kind == ConversationKind::Dm {
            return Err(AppError::InvalidOperation("a DM cannot be left".into()));
        }

        let leaving = conversation
            .participant(user_id)
            .ok_or(AppError::NotFound("participant"))?
            .clone();

        self.store
            .remove_participant(conversation_id, user_id)
            .await?;
        tracing::info!(conversation_id = %conversation_id, user_id = %user_id, "participant left");

        if leaving.role == ParticipantRole::Admin {
            let mut remaining: Vec<&Participant> = conversation
                .participants
                .iter()
                .filter(|p| p.user_id != user_id)
                .collect();
            let has_admin = remaining.iter().any(|p| p.role == ParticipantRole::Admin);
            if !has_admin && !remaining.is_empty() {
                remaining.sort_by_key(|p| p.joined_at);
                let successor = remaining[0].user_id;
                self.store
                    .set_participant_role(conversation_id, successor, ParticipantRole::Admin)
                    .await?;
                tracing::info!(
                    conversation_id = %conversation_id,
                    user_id = %successor,
                    "promoted successor admin"
                );
            }
        }
        Ok(())
    }

    fn notify_added(&self, conversation: &Conversation, added_by: Uuid, recipients: Vec<Uuid>) {
        let group_name = conversation.name.clone().unwrap_or_default();
        let conversation_id = conversation.id;
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            for recipient in recipients {
                notifier
                    .notify(
                        recipient,
                        NotificationEvent::AddedToGroup {
                            conversation_id,
                            group_name: group_name.clone(),
                            added_by,
                        },
                    )
                    .await;
            }
        });
    }
}
