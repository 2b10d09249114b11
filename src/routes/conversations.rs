use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
}

/// POST /conversations/direct
/// Find or create the DM between the caller and another user.
#[post("/conversations/direct")]
pub async fn create_direct(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<CreateDirectRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .find_or_create_dm(user.id, body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// POST /conversations/group
/// Create a group conversation with the caller as admin.
#[post("/conversations/group")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let conversation = state
        .conversations
        .create_group(
            user.id,
            &body.name,
            &body.participant_ids,
            body.description,
            body.event_id,
        )
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

/// GET /conversations
/// The caller's active conversations, newest activity first, with unread counts.
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let summaries = state.conversations.list_user_conversations(user.id).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

/// GET /conversations/{id}
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .get_conversation(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// POST /conversations/{id}/participants
/// Admin-only: add a member to a group conversation.
#[post("/conversations/{id}/participants")]
pub async fn add_participant(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<AddParticipantRequest>,
) -> Result<HttpResponse, AppError> {
    let participant = state
        .conversations
        .add_participant(path.into_inner(), user.id, body.user_id)
        .await?;
    Ok(HttpResponse::Created().json(participant))
}

/// POST /conversations/{id}/leave
#[post("/conversations/{id}/leave")]
pub async fn leave_conversation(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .remove_participant(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /conversations/direct/{user_id}/unread
/// Unread count in the DM with one specific user; 0 when no DM exists.
#[get("/conversations/direct/{user_id}/unread")]
pub async fn direct_unread_count(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let count = state
        .messages
        .unread_count_with_user(user.id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "unread_count": count })))
}
