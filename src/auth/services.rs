use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        claims::Role,
        dto::{LoginRequest, RegisterRequest},
        password::{hash_password, verify_password},
        repo_types::{NewUser, User},
    },
    error::ApiError,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are unique regardless of case.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates a CUSTOMER account and returns its access token.
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<String, ApiError> {
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();

    if name.is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::Validation("email is invalid".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::EmailAlreadyTaken { email });
    }

    let password_hash = hash_password(&req.password)?;
    let new = NewUser {
        name,
        email: email.clone(),
        password_hash,
        role: Role::Customer,
        image: req.image,
    };
    // A concurrent registration may have taken the email since the lookup.
    let Some(user) = state.store.create_user(new).await? else {
        return Err(ApiError::EmailAlreadyTaken { email });
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(state.keys.issue(&user, user.role)?)
}

/// Checks credentials and returns an access token for the stored role.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<String, ApiError> {
    let email = normalize_email(&req.email);

    let user: User = match state.store.find_user_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(%email, "login unknown email");
            return Err(ApiError::EmailNotRegistered { email });
        }
    };

    if !verify_password(&req.password, &user.password_hash) {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(ApiError::WrongPassword);
    }

    info!(user_id = %user.id, %email, "user logged in");
    Ok(state.keys.issue(&user, user.role)?)
}
