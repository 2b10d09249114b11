use dotenvy::dotenv;
use std::env;

/// Which backing store the service runs against.
///
/// `Memory` exists for local development and the test suite; it honors the
/// same `ChatStore` contract as Postgres but keeps everything in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub profile_service_url: String,
    pub notification_service_url: String,
    /// Default page size for message listing; requests may ask for less.
    pub default_page_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let store_backend = match env::var("CHAT_STORE").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(crate::error::AppError::Config("DATABASE_URL missing".into()));
        }

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;

        let profile_service_url = env::var("PROFILE_SERVICE_URL")
            .unwrap_or_else(|_| "http://identity-service:3001".to_string());

        let notification_service_url = env::var("NOTIFICATION_SERVICE_URL")
            .unwrap_or_else(|_| "http://notification-service:3002".to_string());

        let default_page_size = env::var("MESSAGE_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        Ok(Self {
            port,
            store_backend,
            database_url,
            jwt_secret,
            profile_service_url,
            notification_service_url,
            default_page_size,
        })
    }
}
