use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CarListResponse, CarRequest, ListCarsQuery, ListMeta},
    repo_types::{Car, NewCar},
};
use crate::{
    auth::{
        claims::Role,
        guard::{authorize, AccessGuard},
    },
    error::ApiError,
    pagination::Pagination,
    state::AppState,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cars", get(list_cars))
        .route("/v1/cars/:id", get(get_car))
}

pub fn write_routes(state: &AppState) -> Router<AppState> {
    let admin_only = AccessGuard::new(state.keys.clone(), &[Role::Admin]);
    Router::new()
        .route("/v1/cars", post(create_car))
        .route("/v1/cars/:id", axum::routing::put(update_car).delete(delete_car))
        .route_layer(middleware::from_fn_with_state(admin_only, authorize))
}

// --- handlers ---

#[instrument(skip(state, query))]
pub async fn list_cars(
    State(state): State<AppState>,
    query: Result<Query<ListCarsQuery>, QueryRejection>,
) -> Result<Json<CarListResponse>, ApiError> {
    let Query(query) = query?;
    let page = query.page();
    let (cars, count) = state
        .store
        .list_cars(&query.filter(), page.limit(), page.offset())
        .await?;
    Ok(Json(CarListResponse {
        cars,
        meta: ListMeta {
            pagination: Pagination::build(page, count),
        },
    }))
}

#[instrument(skip(state, id))]
pub async fn get_car(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Car>, ApiError> {
    let Path(id) = id?;
    let car = state
        .store
        .find_car(id)
        .await?
        .ok_or(ApiError::RecordNotFound { entity: "car", id })?;
    Ok(Json(car))
}

#[instrument(skip(state, payload))]
pub async fn create_car(
    State(state): State<AppState>,
    payload: Result<Json<CarRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Car>), ApiError> {
    let Json(payload) = payload?;
    let new = NewCar::try_from(payload)?;
    let car = state.store.create_car(new).await?;
    info!(car_id = %car.id, name = %car.name, "car created");
    Ok((StatusCode::CREATED, Json(car)))
}

/// A missing car is reported as 422, like any other unprocessable update.
#[instrument(skip(state, id, payload))]
pub async fn update_car(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CarRequest>, JsonRejection>,
) -> Result<Json<Car>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = NewCar::try_from(payload)?;
    match state.store.update_car(id, changes).await? {
        Some(car) => {
            info!(car_id = %car.id, "car updated");
            Ok(Json(car))
        }
        None => {
            warn!(car_id = %id, "update of unknown car");
            Err(ApiError::Validation(format!("car {id} does not exist")))
        }
    }
}

#[instrument(skip(state, id))]
pub async fn delete_car(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    if state.store.delete_car(id).await? {
        info!(car_id = %id, "car deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}
