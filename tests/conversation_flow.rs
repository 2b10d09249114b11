mod common;

use std::time::Duration;
use uuid::Uuid;

use chat_service::error::AppError;
use chat_service::models::{ConversationKind, ParticipantRole};
use chat_service::services::NotificationEvent;

use common::env_with_users;

#[tokio::test]
async fn dm_is_deduplicated_across_argument_orders() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela")]);

    let first = env.conversations.find_or_create_dm(ana, bela).await.unwrap();
    let second = env.conversations.find_or_create_dm(bela, ana).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, ConversationKind::Dm);
    assert_eq!(first.participants.len(), 2);
}

#[tokio::test]
async fn dm_with_yourself_is_rejected() {
    let ana = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana")]);

    let err = env.conversations.find_or_create_dm(ana, ana).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn dm_with_unknown_user_is_rejected() {
    let ana = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana")]);

    let err = env
        .conversations
        .find_or_create_dm(ana, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("user")));
}

#[tokio::test]
async fn group_creator_becomes_sole_admin() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let cora = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (cora, "Cora")]);

    let group = env
        .conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela, cora, bela], None, None)
        .await
        .unwrap();

    assert_eq!(group.kind, ConversationKind::Group);
    assert_eq!(group.name.as_deref(), Some("Beach Cleanup Crew"));
    // duplicate bela collapses
    assert_eq!(group.participants.len(), 3);
    assert!(group.is_admin(ana));
    assert_eq!(
        group.participant(bela).unwrap().role,
        ParticipantRole::Member
    );
}

#[tokio::test]
async fn group_name_must_not_be_blank() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela")]);

    let err = env
        .conversations
        .create_group(ana, "   ", &[bela], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn non_participant_cannot_fetch_conversation() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (outsider, "Odin")]);

    let dm = env.conversations.find_or_create_dm(ana, bela).await.unwrap();

    let err = env
        .conversations
        .get_conversation(dm.id, outsider)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = env
        .conversations
        .get_conversation(Uuid::new_v4(), ana)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("conversation")));
}

#[tokio::test]
async fn only_admins_add_participants() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let cora = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (cora, "Cora")]);

    let group = env
        .conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela], None, None)
        .await
        .unwrap();

    let err = env
        .conversations
        .add_participant(group.id, bela, cora)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let added = env
        .conversations
        .add_participant(group.id, ana, cora)
        .await
        .unwrap();
    assert_eq!(added.user_id, cora);
    assert_eq!(added.role, ParticipantRole::Member);
}

#[tokio::test]
async fn adding_an_existing_participant_conflicts() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela")]);

    let group = env
        .conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela], None, None)
        .await
        .unwrap();

    let err = env
        .conversations
        .add_participant(group.id, ana, bela)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn participants_cannot_be_added_to_a_dm() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let cora = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (cora, "Cora")]);

    let dm = env.conversations.find_or_create_dm(ana, bela).await.unwrap();

    let err = env
        .conversations
        .add_participant(dm.id, ana, cora)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn a_dm_cannot_be_left() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela")]);

    let dm = env.conversations.find_or_create_dm(ana, bela).await.unwrap();

    let err = env
        .conversations
        .remove_participant(dm.id, ana)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn last_admin_leaving_promotes_the_earliest_member() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let cora = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (cora, "Cora")]);

    // bela joins at creation, cora later; bela is the succession candidate.
    let group = env
        .conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela], None, None)
        .await
        .unwrap();
    env.conversations
        .add_participant(group.id, ana, cora)
        .await
        .unwrap();

    env.conversations
        .remove_participant(group.id, ana)
        .await
        .unwrap();

    let after = env
        .conversations
        .get_conversation(group.id, bela)
        .await
        .unwrap();
    assert!(!after.is_participant(ana));
    assert!(after.is_admin(bela));
    assert!(!after.is_admin(cora));
}

#[tokio::test]
async fn conversation_list_orders_by_recent_activity() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let cora = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela"), (cora, "Cora")]);

    let dm = env.conversations.find_or_create_dm(ana, bela).await.unwrap();
    let group = env
        .conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela, cora], None, None)
        .await
        .unwrap();

    // Activity in the DM bumps it above the group.
    env.messages
        .send(dm.id, bela, "running late", None, None)
        .await
        .unwrap();

    let list = env.conversations.list_user_conversations(ana).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].conversation.id, dm.id);
    assert_eq!(list[0].unread_count, 1);
    assert_eq!(list[1].conversation.id, group.id);
    assert_eq!(list[1].unread_count, 0);
}

#[tokio::test]
async fn group_members_are_notified_of_being_added() {
    let ana = Uuid::new_v4();
    let bela = Uuid::new_v4();
    let env = env_with_users(&[(ana, "Ana"), (bela, "Bela")]);

    env.conversations
        .create_group(ana, "Beach Cleanup Crew", &[bela], None, None)
        .await
        .unwrap();

    // Delivery runs on a detached task.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = env.sink.events.lock().await;
    assert_eq!(events.len(), 1);
    let (recipient, event) = &events[0];
    assert_eq!(*recipient, bela);
    match event {
        NotificationEvent::AddedToGroup {
            group_name,
            added_by,
            ..
        } => {
            assert_eq!(group_name, "Beach Cleanup Crew");
            assert_eq!(*added_by, ana);
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}
