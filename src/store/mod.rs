use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    cars::repo_types::{Car, CarFilter, NewCar},
    rentals::repo_types::{NewRental, Rental, RentOutcome},
};

pub mod memory;
pub mod postgres;

/// Persistence used by the handlers. Lookups return `Ok(None)` for a missing
/// key; `Err` is reserved for infrastructure failures.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// `Ok(None)` when the email is already taken.
    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>>;

    /// One page of cars plus the total number of matches.
    async fn list_cars(
        &self,
        filter: &CarFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Car>, i64)>;
    async fn find_car(&self, id: Uuid) -> anyhow::Result<Option<Car>>;
    async fn create_car(&self, new: NewCar) -> anyhow::Result<Car>;
    async fn update_car(&self, id: Uuid, changes: NewCar) -> anyhow::Result<Option<Car>>;
    /// True if a row was removed. Rentals of the car go with it.
    async fn delete_car(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Rental of `car_id` active at `as_of`, if any.
    async fn active_rental(
        &self,
        car_id: Uuid,
        as_of: OffsetDateTime,
    ) -> anyhow::Result<Option<Rental>>;
    /// Inserts `new` unless it overlaps an existing rental of the same car.
    /// The check and the insert are atomic with respect to other calls for
    /// that car.
    async fn rent_car(&self, new: NewRental) -> anyhow::Result<RentOutcome>;
}
