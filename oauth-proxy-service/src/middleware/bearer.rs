//! # Bearer Authentication Middleware
//!
//! Authenticates every non-exempt request by probing the analytics
//! collaborator with the presented token. The OAuth surface itself is
//! exempt — a client in the middle of the authorization dance does not
//! have a token yet.
//!
//! Every 401 carries a `WWW-Authenticate` header pointing at the
//! protected-resource metadata document, which is how MCP hosts discover
//! the authorization server to register against.

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::errors::ApiResult;
use tracing::{debug, warn};

/// Paths served without a bearer token.
const EXEMPT_PATHS: &[&str] = &[
    "/",
    "/register",
    "/authorize",
    "/consent",
    "/consent/approve",
    "/consent/deny",
    "/auth/callback",
    "/token",
    "/favicon.ico",
];

/// Prefixes served without a bearer token.
const EXEMPT_PREFIXES: &[&str] = &["/.well-known/", "/static/"];

fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path) || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

// =============================================================================
// Token Validator Contract
// =============================================================================

/// The one capability consumed from the analytics collaborator: decide
/// whether a bearer token is currently valid by performing one cheap
/// authenticated read.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate_token(&self, token: &str) -> ApiResult<()>;
}

// =============================================================================
// Middleware
// =============================================================================

/// Builds the standardized 401 response with the `WWW-Authenticate`
/// resource-metadata pointer.
fn unauthorized_response(state: &AppState, error: &'static str, detail: &str) -> Response {
    let resource_metadata = format!(
        "{}/.well-known/oauth-protected-resource",
        state.config.public_base()
    );
    let challenge = format!(
        "Bearer realm=\"OAuth\", resource_metadata=\"{}\"",
        resource_metadata
    );

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": error,
            "error_description": detail,
        })),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }

    response
}

/// Bearer authentication for protected routes.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_exempt(&path) {
        debug!(%path, "Bypassing authentication for exempt path");
        return next.run(request).await;
    }

    let Some(auth_header) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        warn!(%path, "Missing Authorization header");
        return unauthorized_response(&state, "unauthorized", "Missing Authorization header");
    };

    // Exactly two whitespace-separated parts: scheme and token.
    let parts: Vec<&str> = auth_header.split_whitespace().collect();
    let [scheme, token] = parts.as_slice() else {
        warn!(%path, "Invalid Authorization header format");
        return unauthorized_response(&state, "invalid_token", "Invalid Authorization header format");
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        warn!(%path, "Invalid authorization scheme");
        return unauthorized_response(&state, "unauthorized", "Authorization scheme must be Bearer");
    }
    if token.is_empty() {
        warn!(%path, "Empty bearer token");
        return unauthorized_response(&state, "unauthorized", "Token value is empty");
    }

    // One cheap authenticated read against the analytics API; the result
    // is discarded, only success matters.
    if let Err(e) = state.token_validator.validate_token(token).await {
        warn!(%path, error = %e, "Token validation failed");
        return unauthorized_response(&state, "invalid_token", "Invalid or expired token");
    }

    debug!(%path, "Token validated successfully");
    next.run(request).await
}

// =============================================================================
// Tests
// =============================================================================
