use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::claims::TokenPayload;
use crate::error::ApiError;

/// Identity attached by the access guard. Only usable on guarded routes.
pub struct AuthUser(pub TokenPayload);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TokenPayload>()
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::InvalidToken)
    }
}
