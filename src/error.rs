use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::{auth::claims::Role, cars::repo_types::Car};

/// Every failure a handler can surface. Each variant knows its wire name,
/// status code and details object.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No route matched the request.
    #[error("Not found!")]
    NotFound { method: String, url: String },

    #[error("{entity} {id} not found")]
    RecordNotFound { entity: &'static str, id: Uuid },

    /// Missing header, bad signature, malformed or expired token.
    #[error("Invalid token")]
    InvalidToken,

    /// Token is valid but its role is not in the route's allow-list.
    #[error("Access forbidden!")]
    InsufficientAccess { role: Role },

    #[error("{email} is already taken!")]
    EmailAlreadyTaken { email: String },

    #[error("{email} is not registered!")]
    EmailNotRegistered { email: String },

    #[error("Password is not correct!")]
    WrongPassword,

    #[error("{} is already rented!", .car.name)]
    CarAlreadyRented { car: Box<Car> },

    #[error("{0}")]
    Validation(String),

    /// Anything unexpected. The cause is logged, never sent to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// `{ "error": { "name", "message", "details" } }`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub name: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::RecordNotFound { .. } => "NotFoundError",
            Self::InvalidToken => "InvalidTokenError",
            Self::InsufficientAccess { .. } => "InsufficientAccessError",
            Self::EmailAlreadyTaken { .. } => "EmailAlreadyTakenError",
            Self::EmailNotRegistered { .. } => "EmailNotRegisteredError",
            Self::WrongPassword => "WrongPasswordError",
            Self::CarAlreadyRented { .. } => "CarAlreadyRentedError",
            Self::Validation(_) => "ValidationError",
            Self::Internal(_) => "InternalServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            Self::EmailNotRegistered { .. } => StatusCode::NOT_FOUND,
            Self::InvalidToken | Self::InsufficientAccess { .. } | Self::WrongPassword => {
                StatusCode::UNAUTHORIZED
            }
            Self::EmailAlreadyTaken { .. }
            | Self::CarAlreadyRented { .. }
            | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::NotFound { method, url } => Some(json!({ "method": method, "url": url })),
            Self::RecordNotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::InsufficientAccess { role } => Some(json!({ "role": role })),
            Self::EmailAlreadyTaken { email } | Self::EmailNotRegistered { email } => {
                Some(json!({ "email": email }))
            }
            Self::CarAlreadyRented { car } => Some(json!({ "car": car })),
            Self::InvalidToken | Self::WrongPassword | Self::Validation(_) | Self::Internal(_) => {
                None
            }
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let message = match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorEnvelope {
            error: ErrorBody {
                name: self.name(),
                message,
                details: self.details(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!(error = %e, "unhandled error");
        }
        (self.status(), Json(self.envelope())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
