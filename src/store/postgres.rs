use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Store;
use crate::{
    auth::repo_types::{NewUser, User, UserRow},
    cars::repo_types::{Car, CarFilter, NewCar},
    rentals::repo_types::{NewRental, Rental, RentOutcome},
};

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.name, u.email, u.password_hash, r.name AS role_name, u.image, u.created_at
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

const CAR_COLUMNS: &str = r#"
    SELECT c.id, c.name, c.price, c.size, c.image, c.created_at, c.updated_at,
           EXISTS (
               SELECT 1 FROM rentals r
               WHERE r.car_id = c.id
                 AND r.rent_started_at <= now()
                 AND (r.rent_ended_at IS NULL OR r.rent_ended_at > now())
           ) AS is_currently_rented
    FROM cars c
"#;

const CAR_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR c.size = $1)
      AND ($2::timestamptz IS NULL OR NOT EXISTS (
               SELECT 1 FROM rentals r
               WHERE r.car_id = c.id
                 AND r.rent_started_at <= $2
                 AND (r.rent_ended_at IS NULL OR r.rent_ended_at > $2)
          ))
"#;

const RENTAL_COLUMNS: &str =
    "id, user_id, car_id, rent_started_at, rent_ended_at, created_at";

/// SQLSTATE of an exclusion constraint violation.
const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user")?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            WITH inserted AS (
                INSERT INTO users (name, email, password_hash, role_id, image)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (email) DO NOTHING
                RETURNING *
            )
            SELECT i.id, i.name, i.email, i.password_hash, r.name AS role_name, i.image, i.created_at
            FROM inserted i
            JOIN roles r ON r.id = i.role_id
            "#,
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.id())
        .bind(&new.image)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        row.map(User::try_from).transpose()
    }

    async fn list_cars(
        &self,
        filter: &CarFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Car>, i64)> {
        let cars = sqlx::query_as::<_, Car>(&format!(
            "{CAR_COLUMNS} {CAR_FILTER} ORDER BY c.created_at DESC, c.id LIMIT $3 OFFSET $4"
        ))
        .bind(&filter.size)
        .bind(filter.available_at)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list cars")?;

        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM cars c {CAR_FILTER}"))
            .bind(&filter.size)
            .bind(filter.available_at)
            .fetch_one(&self.db)
            .await
            .context("count cars")?;

        Ok((cars, count))
    }

    async fn find_car(&self, id: Uuid) -> anyhow::Result<Option<Car>> {
        let car = sqlx::query_as::<_, Car>(&format!("{CAR_COLUMNS} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find car")?;
        Ok(car)
    }

    async fn create_car(&self, new: NewCar) -> anyhow::Result<Car> {
        let car = sqlx::query_as::<_, Car>(
            r#"
            INSERT INTO cars (name, price, size, image)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, price, size, image, created_at, updated_at,
                      FALSE AS is_currently_rented
            "#,
        )
        .bind(&new.name)
        .bind(new.price)
        .bind(&new.size)
        .bind(&new.image)
        .fetch_one(&self.db)
        .await
        .context("insert car")?;
        Ok(car)
    }

    async fn update_car(&self, id: Uuid, changes: NewCar) -> anyhow::Result<Option<Car>> {
        let updated = sqlx::query(
            r#"
            UPDATE cars
            SET name = $2, price = $3, size = $4, image = $5, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(changes.price)
        .bind(&changes.size)
        .bind(&changes.image)
        .execute(&self.db)
        .await
        .context("update car")?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_car(id).await
    }

    async fn delete_car(&self, id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete car")?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn active_rental(
        &self,
        car_id: Uuid,
        as_of: OffsetDateTime,
    ) -> anyhow::Result<Option<Rental>> {
        let rental = sqlx::query_as::<_, Rental>(&format!(
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE car_id = $1
              AND rent_started_at <= $2
              AND (rent_ended_at IS NULL OR rent_ended_at > $2)
            LIMIT 1
            "#
        ))
        .bind(car_id)
        .bind(as_of)
        .fetch_optional(&self.db)
        .await
        .context("find active rental")?;
        Ok(rental)
    }

    async fn rent_car(&self, new: NewRental) -> anyhow::Result<RentOutcome> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        // Row lock on the car serializes concurrent bookings for it.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM cars WHERE id = $1 FOR UPDATE")
            .bind(new.car_id)
            .fetch_optional(&mut *tx)
            .await
            .context("lock car")?;
        if locked.is_none() {
            return Ok(RentOutcome::CarMissing);
        }

        let (overlapping,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM rentals
                WHERE car_id = $1
                  AND rent_started_at < COALESCE($3::timestamptz, 'infinity')
                  AND (rent_ended_at IS NULL OR rent_ended_at > $2)
            )
            "#,
        )
        .bind(new.car_id)
        .bind(new.window.start)
        .bind(new.window.end)
        .fetch_one(&mut *tx)
        .await
        .context("check overlapping rentals")?;

        if overlapping {
            tx.rollback().await.context("rollback tx")?;
            return self.conflict(new.car_id).await;
        }

        let inserted = sqlx::query_as::<_, Rental>(&format!(
            r#"
            INSERT INTO rentals (user_id, car_id, rent_started_at, rent_ended_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.car_id)
        .bind(new.window.start)
        .bind(new.window.end)
        .fetch_one(&mut *tx)
        .await;

        let rental = match inserted {
            Ok(r) => r,
            Err(e) if is_exclusion_violation(&e) => {
                warn!(car_id = %new.car_id, "rental rejected by exclusion constraint");
                drop(tx);
                return self.conflict(new.car_id).await;
            }
            Err(e) => return Err(anyhow::Error::new(e).context("insert rental")),
        };

        tx.commit().await.context("commit tx")?;
        debug!(rental_id = %rental.id, car_id = %rental.car_id, "rental inserted");
        Ok(RentOutcome::Created(rental))
    }
}

impl PgStore {
    async fn conflict(&self, car_id: Uuid) -> anyhow::Result<RentOutcome> {
        Ok(match self.find_car(car_id).await? {
            Some(car) => RentOutcome::Conflict(car),
            None => RentOutcome::CarMissing,
        })
    }
}

fn is_exclusion_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == EXCLUSION_VIOLATION)
}
