use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Car as returned to clients. `is_currently_rented` is computed at read time.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub size: String,
    pub image: Option<String>,
    pub is_currently_rented: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Writable columns of a car, for both create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCar {
    pub name: String,
    pub price: i64,
    pub size: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CarFilter {
    pub size: Option<String>,
    /// Keep only cars with no rental active at this instant.
    pub available_at: Option<OffsetDateTime>,
}
