use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

/// POST /messages/{id}/reactions
/// Toggle the caller's reaction: absent is added, present is removed.
/// Returns the message with its updated reaction list.
#[post("/messages/{id}/reactions")]
pub async fn toggle_reaction(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<ToggleReactionRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .toggle_reaction(path.into_inner(), user.id, &body.emoji)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}
