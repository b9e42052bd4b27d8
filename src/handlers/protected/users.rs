// handlers/protected/users.rs - /api/users CRUD, callers may only modify themselves

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::handlers::utils::{json_body, non_blank, parse_id, public_user};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;
use crate::store::{Fields, WriteOutcome};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// GET /api/users - all users, passwords stripped
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Value>> {
    let users = state.users.find_all().await?;
    Ok(ApiResponse::success(users.iter().map(public_user).collect()))
}

/// GET /api/users/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::success(public_user(&user)))
}

/// PUT /api/users/:id - update own username and/or email
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    if caller.id != id {
        return Err(ApiError::forbidden("You can only update your own profile"));
    }

    let body = json_body(payload)?;
    let username = non_blank(body.username.as_ref());
    let email = non_blank(body.email.as_ref());
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation_error(
            "Provide at least one of: username, email",
            None,
        ));
    }

    let mut fields = Fields::new();
    if let Some(username) = &username {
        fields.insert("username", username.as_str());
    }
    if let Some(email) = &email {
        fields.insert("email", email.as_str());
    }

    let outcome = state
        .users
        .update_unless(
            id,
            |u| {
                (email.is_some() && u.get_str("email") == email.as_deref())
                    || (username.is_some() && u.get_str("username") == username.as_deref())
            },
            fields,
        )
        .await?;
    let user = match outcome {
        WriteOutcome::Written(user) => user,
        WriteOutcome::NotFound => return Err(ApiError::not_found("User not found")),
        WriteOutcome::Rejected => {
            return Err(ApiError::conflict("Email or username already in use"))
        }
    };

    info!(user_id = id, "user updated");
    Ok(ApiResponse::success(json!({
        "message": "User updated",
        "user": public_user(&user),
    })))
}

/// DELETE /api/users/:id - delete own account
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    if caller.id != id {
        return Err(ApiError::forbidden("You can only delete your own account"));
    }

    if !state.users.delete(id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = id, "user deleted");
    Ok(ApiResponse::success(json!({ "message": "User deleted" })))
}
