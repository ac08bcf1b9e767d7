use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{
    auth::{
        claims::{Role, TokenPayload},
        jwt::JwtKeys,
    },
    error::ApiError,
};

/// Per-route gate: a valid bearer token whose role is in `allowed`.
#[derive(Clone)]
pub struct AccessGuard {
    keys: JwtKeys,
    allowed: Arc<[Role]>,
}

impl AccessGuard {
    pub fn new(keys: JwtKeys, allowed: &[Role]) -> Self {
        Self {
            keys,
            allowed: allowed.into(),
        }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<TokenPayload, ApiError> {
        let token = bearer_token(headers).ok_or_else(|| {
            warn!("missing or malformed Authorization header");
            ApiError::InvalidToken
        })?;

        let payload = self.keys.verify(token)?;

        if !self.allowed.contains(&payload.role.name) {
            warn!(user_id = %payload.id, role = %payload.role.name, "role not allowed");
            return Err(ApiError::InsufficientAccess {
                role: payload.role.name,
            });
        }

        Ok(payload)
    }
}

// Expect "Bearer <token>"
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware for `from_fn_with_state`. Stores the decoded payload in the
/// request extensions for [`AuthUser`](super::extractors::AuthUser).
pub async fn authorize(State(guard): State<AccessGuard>, mut req: Request, next: Next) -> Response {
    match guard.check(req.headers()) {
        Ok(payload) => {
            req.extensions_mut().insert(payload);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
