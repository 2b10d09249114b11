//! Bearer-token identity extraction.
//!
//! Session issuance lives in the identity service; this layer only verifies
//! the HS256 signature and expiry, then exposes the caller's user id.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        AppError::Unauthorized
    })
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser {
    pub id: Uuid,
}

fn extract(req: &HttpRequest) -> Result<AuthedUser, actix_web::Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or(AppError::Internal)?;

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = decode_token(token, &state.config.jwt_secret)?;
    Ok(AuthedUser { id: claims.sub })
}

impl FromRequest for AuthedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[test]
    fn round_trips_valid_token() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let decoded = decode_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(decode_token(&token, "other-secret").is_err());
    }
}
