// handlers/protected/products.rs - product writes, owner-only for update/delete

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::ApiError;
use crate::handlers::utils::{coerce_number, json_body, owner_id, parse_id, require_object};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;
use crate::store::{Fields, Record, WriteOutcome};

/// Fields a client may set on a product
const PRODUCT_FIELDS: &[&str] = &["name", "description", "price", "category"];

/// POST /api/products - create a product owned by the caller
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let body = require_object(json_body(payload)?)?;

    let has_name = body
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    let has_price = body.get("price").is_some_and(|p| !p.is_null());
    if !has_name || !has_price {
        return Err(ApiError::missing_fields(&["name", "price"]));
    }

    let mut fields = product_fields(&body)?;
    fields.insert("userId", caller.id);

    let product = state.products.create(fields).await?;
    info!(product_id = product.id(), user_id = caller.id, "product created");

    Ok(ApiResponse::created(json!({
        "message": "Product created",
        "product": product.into_value(),
    })))
}

/// PUT /api/products/:id - shallow update of the supplied product fields
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let body = require_object(json_body(payload)?)?;
    let fields = product_fields(&body)?;

    let outcome = state
        .products
        .update_if(id, |p| owner_id(p) == Some(caller.id), fields)
        .await?;
    let product = owned_write(outcome, "update")?;

    info!(product_id = id, user_id = caller.id, "product updated");
    Ok(ApiResponse::success(json!({
        "message": "Product updated",
        "product": product.into_value(),
    })))
}

/// DELETE /api/products/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;

    let outcome = state
        .products
        .delete_if(id, |p| owner_id(p) == Some(caller.id))
        .await?;
    owned_write(outcome, "delete")?;

    info!(product_id = id, user_id = caller.id, "product deleted");
    Ok(ApiResponse::success(json!({ "message": "Product deleted" })))
}

/// 404 if the product is gone, 403 if the caller does not own it
fn owned_write(outcome: WriteOutcome<Record>, action: &str) -> Result<Record, ApiError> {
    match outcome {
        WriteOutcome::Written(product) => Ok(product),
        WriteOutcome::NotFound => Err(ApiError::not_found("Product not found")),
        WriteOutcome::Rejected => Err(ApiError::forbidden(format!(
            "You can only {} your own products",
            action
        ))),
    }
}

/// Whitelisted product fields present in the body, with price coerced to a number
fn product_fields(body: &Map<String, Value>) -> Result<Fields, ApiError> {
    let mut fields = Fields::new();
    for &key in PRODUCT_FIELDS {
        let Some(value) = body.get(key) else { continue };
        if value.is_null() {
            continue;
        }
        if key == "price" {
            fields.insert(key, coerce_number(key, value)?);
        } else {
            fields.insert(key, value.clone());
        }
    }
    Ok(fields)
}
