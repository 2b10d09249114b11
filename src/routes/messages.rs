use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthedUser;
use crate::models::MessageKind;
use crate::state::AppState;
use crate::websocket::events::broadcast_message_new;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

/// POST /conversations/{id}/messages
/// Persist a message and fan it out to the conversation's live room.
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .messages
        .send(
            path.into_inner(),
            user.id,
            &body.content,
            body.kind,
            body.reply_to,
        )
        .await?;

    broadcast_message_new(&state.registry, &message).await;
    Ok(HttpResponse::Created().json(message))
}

/// GET /conversations/{id}/messages
///
/// Returns one page of history, oldest first. Fetching a page marks its
/// messages read for the caller.
#[get("/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, AppError> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(state.config.default_page_size);

    let history = state
        .messages
        .list(path.into_inner(), user.id, page, page_size)
        .await?;
    Ok(HttpResponse::Ok().json(history))
}

/// PATCH /messages/{id}
/// Sender-only content edit.
#[patch("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .edit(path.into_inner(), user.id, &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

/// DELETE /messages/{id}
/// Sender-only soft delete; idempotent.
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.messages.delete(path.into_inner(), user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}
