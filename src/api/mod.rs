use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::{authenticate, request_id};
use crate::AppState;

pub mod handlers;

/// Token management routes, relative to their mount point.
/// Every route requires a bearer token; per-route capability checks
/// happen in the handlers.
pub fn token_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::list_tokens).post(handlers::create_token))
        .route("/introspect", post(handlers::introspect_token))
        .route("/refresh", get(handlers::refresh_token))
        .route(
            "/:id",
            get(handlers::get_token).delete(handlers::delete_token),
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

/// Full application: health check plus the token API under `/api/v1/tokens`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1/tokens", token_router(state.clone()))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
