// handlers/protected/items.rs - free-form /api/items CRUD

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::handlers::utils::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::{Fields, Record};

pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Value>> {
    let items = state.items.find_all().await?;
    Ok(ApiResponse::success(
        items.into_iter().map(Record::into_value).collect(),
    ))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let item = state
        .items
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    Ok(ApiResponse::success(item.into_value()))
}

/// POST /api/items - any JSON object; `id` and timestamps are assigned
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let fields = Fields::from_json(json_body(payload)?)?;
    let item = state.items.create(fields).await?;
    Ok(ApiResponse::created(json!({
        "message": "Item created",
        "item": item.into_value(),
    })))
}

/// PUT /api/items/:id - shallow merge
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let fields = Fields::from_json(json_body(payload)?)?;
    let item = state
        .items
        .update(id, fields)
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    Ok(ApiResponse::success(json!({
        "message": "Item updated",
        "item": item.into_value(),
    })))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    if !state.items.delete(id).await? {
        return Err(ApiError::not_found("Item not found"));
    }
    Ok(ApiResponse::success(json!({ "message": "Item deleted" })))
}
