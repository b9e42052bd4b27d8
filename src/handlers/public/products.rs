// handlers/public/products.rs - GET /api/products, GET /api/products/:id

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::utils::{owner_id, parse_id};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::Record;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<u64>,
}

impl ProductQuery {
    fn matches(&self, product: &Record) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |c| product.get_str("category") == Some(c));
        let owner_ok = self.user_id.map_or(true, |id| owner_id(product) == Some(id));
        category_ok && owner_ok
    }
}

/// GET /api/products - list products, optionally filtered by category or owner
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Vec<Value>> {
    let products = state
        .products
        .find_all()
        .await?
        .into_iter()
        .filter(|p| query.matches(p))
        .map(Record::into_value)
        .collect();
    Ok(ApiResponse::success(products))
}

/// GET /api/products/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let product = state
        .products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(ApiResponse::success(product.into_value()))
}
