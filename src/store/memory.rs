use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::Store;
use crate::{
    auth::repo_types::{NewUser, User},
    cars::repo_types::{Car, CarFilter, NewCar},
    rentals::{
        conflict::{first_conflict, is_free_at},
        repo_types::{NewRental, Rental, RentOutcome},
    },
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    cars: HashMap<Uuid, Car>,
    rentals: Vec<Rental>,
}

impl Tables {
    fn is_free_at(&self, car_id: Uuid, as_of: OffsetDateTime) -> bool {
        let windows: Vec<_> = self.rentals_of(car_id).map(Rental::window).collect();
        is_free_at(windows.iter(), as_of)
    }

    fn rentals_of(&self, car_id: Uuid) -> impl Iterator<Item = &Rental> {
        self.rentals.iter().filter(move |r| r.car_id == car_id)
    }

    /// Copy of the stored car with the rented flag evaluated now.
    fn car_snapshot(&self, car: &Car) -> Car {
        let mut car = car.clone();
        car.is_currently_rented = !self.is_free_at(car.id, OffsetDateTime::now_utc());
        car
    }
}

/// In-process store. Bookings for one car are serialized by a per-car mutex
/// held across the overlap check and the insert.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    car_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn car_lock(&self, car_id: Uuid) -> Arc<Mutex<()>> {
        self.car_locks
            .lock()
            .await
            .entry(car_id)
            .or_default()
            .clone()
    }

    async fn forget_car(&self, car_id: Uuid) {
        self.car_locks.lock().await.remove(&car_id);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            image: new.image,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn list_cars(
        &self,
        filter: &CarFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Car>, i64)> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Car> = tables
            .cars
            .values()
            .filter(|c| filter.size.as_ref().map_or(true, |s| &c.size == s))
            .filter(|c| {
                filter
                    .available_at
                    .map_or(true, |t| tables.is_free_at(c.id, t))
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let count = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|c| tables.car_snapshot(c))
            .collect();
        Ok((page, count))
    }

    async fn find_car(&self, id: Uuid) -> anyhow::Result<Option<Car>> {
        let tables = self.tables.read().await;
        Ok(tables.cars.get(&id).map(|c| tables.car_snapshot(c)))
    }

    async fn create_car(&self, new: NewCar) -> anyhow::Result<Car> {
        let now = OffsetDateTime::now_utc();
        let car = Car {
            id: Uuid::new_v4(),
            name: new.name,
            price: new.price,
            size: new.size,
            image: new.image,
            is_currently_rented: false,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.cars.insert(car.id, car.clone());
        Ok(car)
    }

    async fn update_car(&self, id: Uuid, changes: NewCar) -> anyhow::Result<Option<Car>> {
        let mut tables = self.tables.write().await;
        let Some(car) = tables.cars.get_mut(&id) else {
            return Ok(None);
        };
        car.name = changes.name;
        car.price = changes.price;
        car.size = changes.size;
        car.image = changes.image;
        car.updated_at = OffsetDateTime::now_utc();
        let car = car.clone();
        Ok(Some(tables.car_snapshot(&car)))
    }

    async fn delete_car(&self, id: Uuid) -> anyhow::Result<bool> {
        let removed = {
            let mut tables = self.tables.write().await;
            let removed = tables.cars.remove(&id).is_some();
            if removed {
                tables.rentals.retain(|r| r.car_id != id);
            }
            removed
        };
        // A booking still holding the old lock finds the car gone.
        self.forget_car(id).await;
        Ok(removed)
    }

    async fn active_rental(
        &self,
        car_id: Uuid,
        as_of: OffsetDateTime,
    ) -> anyhow::Result<Option<Rental>> {
        let tables = self.tables.read().await;
        let active = tables
            .rentals_of(car_id)
            .find(|r| r.window().is_active_at(as_of))
            .cloned();
        Ok(active)
    }

    async fn rent_car(&self, new: NewRental) -> anyhow::Result<RentOutcome> {
        let lock = self.car_lock(new.car_id).await;
        let _held = lock.lock().await;

        let blocked = {
            let tables = self.tables.read().await;
            let outcome = match tables.cars.get(&new.car_id) {
                None => Some(RentOutcome::CarMissing),
                Some(car) => {
                    let windows: Vec<_> =
                        tables.rentals_of(new.car_id).map(Rental::window).collect();
                    first_conflict(&windows, &new.window)
                        .map(|_| RentOutcome::Conflict(tables.car_snapshot(car)))
                }
            };
            outcome
        };
        match blocked {
            Some(RentOutcome::CarMissing) => {
                self.forget_car(new.car_id).await;
                return Ok(RentOutcome::CarMissing);
            }
            Some(outcome) => return Ok(outcome),
            None => {}
        }

        let mut tables = self.tables.write().await;
        if !tables.cars.contains_key(&new.car_id) {
            drop(tables);
            self.forget_car(new.car_id).await;
            return Ok(RentOutcome::CarMissing);
        }
        let rental = Rental {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            car_id: new.car_id,
            rent_started_at: new.window.start,
            rent_ended_at: new.window.end,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.rentals.push(rental.clone());
        debug!(rental_id = %rental.id, car_id = %rental.car_id, "rental inserted");
        Ok(RentOutcome::Created(rental))
    }
}
