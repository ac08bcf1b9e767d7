use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    middleware,
    routing::post,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{dto::RentCarRequest, repo_types::Rental, services::create_rental};
use crate::{
    auth::{
        claims::Role,
        extractors::AuthUser,
        guard::{authorize, AccessGuard},
    },
    error::ApiError,
    state::AppState,
};

pub fn rent_routes(state: &AppState) -> Router<AppState> {
    let customers = AccessGuard::new(state.keys.clone(), &[Role::Customer]);
    Router::new()
        .route("/v1/cars/:id/rent", post(rent_car))
        .route_layer(middleware::from_fn_with_state(customers, authorize))
}

#[instrument(skip(state, identity, id, payload), fields(user_id = %identity.0.id))]
pub async fn rent_car(
    State(state): State<AppState>,
    identity: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RentCarRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Rental>), ApiError> {
    let Path(car_id) = id?;
    let Json(payload) = payload?;
    let AuthUser(user) = identity;

    let rental = create_rental(
        state.store.as_ref(),
        car_id,
        user.id,
        payload.rent_started_at,
        payload.rent_ended_at,
        state.config.default_rental_days,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(rental)))
}
