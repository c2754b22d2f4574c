//! API Middleware
//!
//! Session authentication and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use crate::auth;
use crate::domain::ActorContext;

/// Header carrying the opaque session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

// =========================================================================
// Session Authentication Middleware
// =========================================================================

/// Resolve the session token to an [`ActorContext`] or fail with 401.
/// Handlers behind this middleware can rely on the actor extension being
/// present; the ledger never reaches into ambient request state itself.
pub async fn auth_middleware(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = match headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(token) => token,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing X-Session-Token header",
                    "error_code": "missing_session_token"
                })),
            )
                .into_response());
        }
    };

    let session = match auth::find_session(&pool, token).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Database error during session validation: {}", e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "error_code": "database_error"
                })),
            )
                .into_response());
        }
    };

    let session = match session {
        Some(session) => session,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Invalid session",
                    "error_code": "invalid_session"
                })),
            )
                .into_response());
        }
    };

    if session.is_expired(Utc::now()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Session expired",
                "error_code": "session_expired"
            })),
        )
            .into_response());
    }

    request
        .extensions_mut()
        .insert(ActorContext::new(session.user_id, session.user_name));

    Ok(next.run(request).await)
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Credential-bearing headers never land in logs.
fn is_sensitive_header(name: &str) -> bool {
    matches!(
        name,
        "x-session-token" | "authorization" | "cookie" | "set-cookie"
    )
}

/// Render a header map for logging, with credential values redacted.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            let value = if is_sensitive_header(&name) {
                "<redacted>".to_string()
            } else {
                value.to_str().unwrap_or("<non-utf8>").to_string()
            };
            (name, value)
        })
        .collect()
}

/// Log each request with its latency and status.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!(
        method = %method,
        uri = %uri,
        headers = ?redact_headers(request.headers()),
        "request received"
    );

    let started = std::time::Instant::now();
    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        elapsed_ms = %started.elapsed().as_millis(),
        "request handled"
    );

    response
}
