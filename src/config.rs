use anyhow::{bail, Context};
use serde::Deserialize;

/// One year.
pub const MAX_JWT_TTL_MINUTES: i64 = 60 * 24 * 365;
pub const MAX_RENTAL_DEFAULT_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

/// Credentials of the administrator created at startup when missing.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the API on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub default_rental_days: i64,
    pub admin: Option<AdminSeed>,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            ttl_minutes: parse_bounded("JWT_TTL_MINUTES", 60 * 24, MAX_JWT_TTL_MINUTES)?,
        };
        let admin = match (
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                name: std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".into()),
                email,
                password,
            }),
            _ => None,
        };
        let port = std::env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .context("APP_PORT must be a port number")?;

        Ok(Self {
            database_url,
            jwt,
            default_rental_days: parse_bounded("RENTAL_DEFAULT_DAYS", 1, MAX_RENTAL_DEFAULT_DAYS)?,
            admin,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
        })
    }
}

fn parse_bounded(key: &str, default: i64, max: i64) -> anyhow::Result<i64> {
    bounded(key, std::env::var(key).ok().as_deref(), default, max)
}

// Unset or unparsable falls back to `default`; a number outside 1..=max is an error.
fn bounded(key: &str, raw: Option<&str>, default: i64, max: i64) -> anyhow::Result<i64> {
    let Some(value) = raw.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return Ok(default);
    };
    if !(1..=max).contains(&value) {
        bail!("{key} must be between 1 and {max}, got {value}");
    }
    Ok(value)
}
