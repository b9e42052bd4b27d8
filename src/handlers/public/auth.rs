// handlers/public/auth.rs - POST /api/auth/register, POST /api/auth/login

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, AuthError};
use crate::error::ApiError;
use crate::handlers::utils::{json_body, non_blank, public_user};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::{Fields, WriteOutcome};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// POST /api/auth/register - create a user with a hashed password
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;

    let username = non_blank(body.username.as_ref());
    let email = non_blank(body.email.as_ref());
    let password = body.password.filter(|p| !p.is_empty());

    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(ApiError::missing_fields(&["username", "email", "password"]));
    };

    let min_len = state.config.security.min_password_length;
    if password.chars().count() < min_len {
        return Err(ApiError::validation_error(
            format!("Password must be at least {} characters", min_len),
            None,
        ));
    }

    let password_hash = hash_blocking(password).await?;
    let fields = Fields::new()
        .with("username", username.as_str())
        .with("email", email.as_str())
        .with("password", password_hash);

    // Uniqueness is checked under the same lock as the insert
    let outcome = state
        .users
        .create_unless(
            |u| {
                u.get_str("email") == Some(email.as_str())
                    || u.get_str("username") == Some(username.as_str())
            },
            fields,
        )
        .await?;
    let WriteOutcome::Written(user) = outcome else {
        return Err(ApiError::conflict("Email or username already in use"));
    };

    info!(user_id = user.id(), "user registered");

    Ok(ApiResponse::created(json!({
        "message": "User created",
        "user": public_user(&user),
    })))
}

/// POST /api/auth/login - verify credentials and issue a token
///
/// Accepts `email` or `username` alongside `password`.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let body = json_body(payload)?;

    let email = non_blank(body.email.as_ref());
    let username = non_blank(body.username.as_ref());
    let password = body.password.filter(|p| !p.is_empty());

    let Some(password) = password else {
        return Err(ApiError::missing_fields(&["email", "password"]));
    };

    let user = match (email, username) {
        (Some(email), _) => {
            state
                .users
                .find_first(|u| u.get_str("email") == Some(email.as_str()))
                .await?
        }
        (None, Some(username)) => {
            state
                .users
                .find_first(|u| u.get_str("username") == Some(username.as_str()))
                .await?
        }
        (None, None) => return Err(ApiError::missing_fields(&["email", "password"])),
    };

    let Some(user) = user else {
        warn!("login failed: unknown account");
        return Err(AuthError::InvalidCredentials.into());
    };

    let Some(stored_hash) = user.get_str("password").map(str::to_string) else {
        warn!(user_id = user.id(), "login failed: account has no password");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_blocking(password, stored_hash).await? {
        warn!(user_id = user.id(), "login failed: wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.tokens.issue(&user)?;
    info!(user_id = user.id(), "user logged in");

    Ok(ApiResponse::success(json!({
        "message": "Login successful",
        "token": token,
        "expires_in": state.tokens.expiry_hours() * 3600,
        "user": {
            "id": user.id(),
            "username": user.get("username"),
            "email": user.get("email"),
        }
    })))
}

// argon2 runs on the blocking pool
async fn hash_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("hash task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn verify_blocking(password: String, stored_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("verify task failed: {}", e)))?
        .map_err(ApiError::from)
}
