use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        claims::Role,
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        extractors::AuthUser,
        guard::{authorize, AccessGuard},
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
}

pub fn whoami_routes(state: &AppState) -> Router<AppState> {
    let guard = AccessGuard::new(state.keys.clone(), &[Role::Customer, Role::Admin]);
    Router::new()
        .route("/v1/auth/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(guard, authorize))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let access_token = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { access_token })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let access_token = services::login(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { access_token })))
}

#[instrument(skip(state, identity), fields(user_id = %identity.0.id))]
pub async fn whoami(
    State(state): State<AppState>,
    identity: AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let AuthUser(payload) = identity;
    let user = state
        .store
        .find_user(payload.id)
        .await?
        .ok_or(ApiError::RecordNotFound {
            entity: "user",
            id: payload.id,
        })?;
    Ok(Json(PublicUser::from(user)))
}
