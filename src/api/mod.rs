//! API module
//!
//! HTTP routing and middleware.

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod middleware;
pub mod routes;

pub use routes::create_router;

/// Build the full application router: business routes under `/api/v1` behind
/// session auth, health check open.
///
/// Axum layers run in reverse registration order: logging, then auth, then
/// the handler.
pub fn build_router(pool: SqlitePool) -> Router {
    let protected_routes = create_router()
        .layer(axum::middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
