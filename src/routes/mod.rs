use actix_web::{get, web, HttpResponse};
use serde_json::json;

pub mod conversations;
pub mod messages;
pub mod reactions;
pub mod wsroute;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Registers the full HTTP and WebSocket surface.
///
/// Literal paths are registered before their `{id}` siblings so `direct`
/// never binds as a conversation id.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(conversations::create_direct)
        .service(conversations::create_group)
        .service(conversations::direct_unread_count)
        .service(conversations::list_conversations)
        .service(conversations::get_conversation)
        .service(conversations::add_participant)
        .service(conversations::leave_conversation)
        .service(messages::send_message)
        .service(messages::list_messages)
        .service(messages::edit_message)
        .service(messages::delete_message)
        .service(reactions::toggle_reaction)
        .service(wsroute::ws_handler);
}
