use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use tokio_postgres::NoTls;

use crate::error::{AppError, AppResult};

// Schema is idempotent; applied on every startup.
const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

pub async fn init_pool(database_url: &str) -> AppResult<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AppError::StartServer(format!("db pool: {e}")))?;

    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("database schema applied");

    Ok(pool)
}
