use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full application router for the given state
pub fn app(state: AppState) -> Router {
    let api = &state.config.api;
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Mixed: public reads, protected writes
        .merge(product_routes(&state))
        // Protected
        .merge(user_routes(&state))
        .merge(item_routes(&state))
        .layer(DefaultBodyLimit::max(api.max_request_size_bytes));

    if state.config.security.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    if api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
}

fn product_routes(state: &AppState) -> Router<AppState> {
    use protected::products as write;
    use public::products as read;

    let auth = || from_fn_with_state(state.clone(), jwt_auth_middleware);

    Router::new()
        .route(
            "/api/products",
            get(read::list).merge(post(write::create).route_layer(auth())),
        )
        .route(
            "/api/products/:id",
            get(read::get).merge(
                put(write::update)
                    .delete(write::delete)
                    .route_layer(auth()),
            ),
        )
}

fn user_routes(state: &AppState) -> Router<AppState> {
    use protected::users;

    Router::new()
        .route("/api/users", get(users::list))
        .route(
            "/api/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
}

fn item_routes(state: &AppState) -> Router<AppState> {
    use protected::items;

    Router::new()
        .route("/api/items", get(items::list).post(items::create))
        .route(
            "/api/items/:id",
            get(items::get).put(items::update).delete(items::delete),
        )
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "flatfile-api",
            "version": version,
            "description": "REST API with JWT login and CRUD over JSON file collections",
            "endpoints": {
                "auth": "POST /api/auth/register, POST /api/auth/login (public)",
                "users": "/api/users[/:id] (protected, self-only writes)",
                "products": "/api/products[/:id] (public reads, owner-only writes)",
                "items": "/api/items[/:id] (protected)",
                "health": "/health (public)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.data_dir.health_check().await {
        tracing::error!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Storage unavailable"));
    }

    Ok(Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "storage": "ok"
        }
    })))
}
