use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    rentals::{
        conflict::RentalWindow,
        repo_types::{NewRental, Rental, RentOutcome},
    },
    store::Store,
};

/// True when no rental of `car_id` is active at `as_of`.
pub async fn is_car_available(
    store: &dyn Store,
    car_id: Uuid,
    as_of: OffsetDateTime,
) -> anyhow::Result<bool> {
    Ok(store.active_rental(car_id, as_of).await?.is_none())
}

/// Books `car_id` for `user_id`. A missing end date defaults to
/// `default_days` after the start.
pub async fn create_rental(
    store: &dyn Store,
    car_id: Uuid,
    user_id: Uuid,
    rent_started_at: OffsetDateTime,
    rent_ended_at: Option<OffsetDateTime>,
    default_days: i64,
) -> Result<Rental, ApiError> {
    let Some(car) = store.find_car(car_id).await? else {
        return Err(ApiError::RecordNotFound {
            entity: "car",
            id: car_id,
        });
    };

    let end = match rent_ended_at {
        Some(end) => end,
        None => rent_started_at
            .checked_add(Duration::days(default_days))
            .ok_or_else(|| ApiError::Validation("rentStartedAt is out of range".into()))?,
    };
    if end <= rent_started_at {
        return Err(ApiError::Validation(
            "rentEndedAt must be after rentStartedAt".into(),
        ));
    }

    // Cheap rejection without taking the per-car lock. `rent_car` below
    // re-checks the whole window atomically.
    if !is_car_available(store, car_id, rent_started_at).await? {
        warn!(%car_id, %user_id, "car busy at requested start");
        return Err(ApiError::CarAlreadyRented { car: Box::new(car) });
    }

    let new = NewRental {
        user_id,
        car_id,
        window: RentalWindow {
            start: rent_started_at,
            end: Some(end),
        },
    };

    match store.rent_car(new).await? {
        RentOutcome::Created(rental) => {
            info!(rental_id = %rental.id, %car_id, %user_id, "car rented");
            Ok(rental)
        }
        RentOutcome::Conflict(car) => {
            warn!(%car_id, %user_id, "car already rented for requested window");
            Err(ApiError::CarAlreadyRented { car: Box::new(car) })
        }
        RentOutcome::CarMissing => Err(ApiError::RecordNotFound {
            entity: "car",
            id: car_id,
        }),
    }
}
