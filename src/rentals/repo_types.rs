use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{cars::repo_types::Car, rentals::conflict::RentalWindow};

/// One booking interval of one car by one user.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    pub id: Uuid,
    pub user_id: Uuid,
    pub car_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub rent_started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rent_ended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Rental {
    pub fn window(&self) -> RentalWindow {
        RentalWindow {
            start: self.rent_started_at,
            end: self.rent_ended_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRental {
    pub user_id: Uuid,
    pub car_id: Uuid,
    pub window: RentalWindow,
}

/// Result of the atomic check-then-insert.
#[derive(Debug)]
pub enum RentOutcome {
    Created(Rental),
    /// An existing rental overlaps; carries the car as it is now.
    Conflict(Car),
    CarMissing,
}
