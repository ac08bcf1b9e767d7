use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use anyhow::Context;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::{
        claims::{Role, RoleRef, TokenPayload},
        repo_types::User,
    },
    config::{JwtConfig, MAX_JWT_TTL_MINUTES},
    error::ApiError,
};

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::minutes(cfg.ttl_minutes.clamp(1, MAX_JWT_TTL_MINUTES)),
        }
    }

    /// Signs a token for `user` carrying `role`.
    pub fn issue(&self, user: &User, role: Role) -> anyhow::Result<String> {
        self.issue_at(user, role, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user: &User, role: Role, now: OffsetDateTime) -> anyhow::Result<String> {
        let expires_at = now
            .checked_add(self.ttl)
            .context("token expiry out of range")?;
        let payload = TokenPayload {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            role: RoleRef::from(role),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)?;
        debug!(user_id = %user.id, %role, "jwt signed");
        Ok(token)
    }

    /// Decodes `token`. Every failure, whatever its cause, is `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<TokenPayload>(token, &self.decoding, &validation) {
            Ok(data) => {
                debug!(user_id = %data.claims.id, role = %data.claims.role.name, "jwt verified");
                Ok(data.claims)
            }
            Err(e) => {
                warn!(error = %e, "jwt rejected");
                Err(ApiError::InvalidToken)
            }
        }
    }
}
