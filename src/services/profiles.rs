//! Identity profile resolution.
//!
//! The chat core trusts the identity service as the source of display
//! profiles and denormalizes `{name, avatar}` onto participants and messages
//! at write time. Snapshots are never updated retroactively.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Resolve a user's display profile. `NotFound` when the user does not exist.
    async fn resolve(&self, user_id: Uuid) -> AppResult<UserProfile>;
}

/// HTTP client for the identity service's internal profile endpoint.
pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn resolve(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let url = format!("{}/internal/v1/users/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "profile lookup failed");
            AppError::ServiceUnavailable("identity service unreachable".into())
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("user"));
        }
        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "identity service returned {}",
                response.status()
            )));
        }

        response.json::<UserProfile>().await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "malformed profile payload");
            AppError::ServiceUnavailable("malformed identity response".into())
        })
    }
}
