use actix_web::{web, App, HttpServer};
use chat_service::{
    config::{Config, StoreBackend},
    db, error, logging, routes,
    services::{ConversationService, HttpNotificationSink, HttpProfileDirectory, MessageService},
    state::AppState,
    store::{ChatStore, MemoryChatStore, PostgresChatStore},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let store: Arc<dyn ChatStore> = match cfg.store_backend {
        StoreBackend::Postgres => {
            let url = cfg
                .database_url
                .clone()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(&url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            Arc::new(PostgresChatStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Arc::new(MemoryChatStore::new())
        }
    };

    let profiles = Arc::new(HttpProfileDirectory::new(cfg.profile_service_url.clone()));
    let notifier = Arc::new(HttpNotificationSink::new(
        cfg.notification_service_url.clone(),
    ));

    let conversations =
        ConversationService::new(store.clone(), profiles.clone(), notifier.clone());
    let messages = MessageService::new(store.clone(), profiles, notifier);
    let state = AppState::new(cfg.clone(), store, conversations, messages);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
