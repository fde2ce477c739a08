//! Caller identity as forwarded by the API gateway.
//!
//! The gateway validates the bearer token and sets `X-User-Id`; this service
//! trusts that header and forwards the original token to downstream calls.

use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AuthToken;

pub const USER_ID_HEADER: &str = "X-User-Id";

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub token: AuthToken,
}

impl AuthContext {
    fn from_http(req: &HttpRequest) -> Result<Self, AppError> {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing user context".into()))
            .and_then(|raw| {
                Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::Authentication("Invalid user id".into()))
            })?;

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            user_id,
            token: AuthToken(token),
        })
    }
}

impl FromRequest for AuthContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}
