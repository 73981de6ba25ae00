//! # Body-Size Guard
//!
//! Enforces the maximum request-body size in two stages:
//!
//! 1. A declared `Content-Length` at or above the limit is rejected with
//!    413 before any body byte is read; a malformed one is a 400.
//! 2. Bodies streamed without a usable length are bounded by the
//!    request-body-limit layer mounted on the router
//!    (`DefaultBodyLimit::max`): the wrapped body raises an internal
//!    length error once the limit is exceeded, which surfaces as a 413 at
//!    the extractor boundary. This middleware stamps `Connection: close`
//!    onto any 413 on the way out.
//!
//! Draining whatever the client already sent is left to the HTTP server's
//! connection handling, so the client observes a proper response instead
//! of a reset.

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

fn reject(status: StatusCode, detail: &str) -> Response {
    let mut response = (
        status,
        Json(serde_json::json!({
            "error": "invalid_request",
            "error_description": detail,
        })),
    )
        .into_response();

    // Oversized uploads poison the connection; tell the client to drop it.
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Content-Length precheck plus `Connection: close` stamping for 413s.
pub async fn enforce_max_body_size(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.limits.max_body_size;

    if let Some(value) = request.headers().get(header::CONTENT_LENGTH) {
        match value.to_str().ok().and_then(|v| v.parse::<usize>().ok()) {
            Some(length) if length >= limit => {
                warn!(length, limit, "Declared Content-Length exceeds the body limit");
                return reject(StatusCode::PAYLOAD_TOO_LARGE, "Content-Length too large");
            }
            Some(_) => {}
            None => {
                warn!("Malformed Content-Length header");
                return reject(StatusCode::BAD_REQUEST, "Invalid Content-Length");
            }
        }
    }

    let mut response = next.run(request).await;

    // Length-unknown bodies trip the body-limit layer deeper in the
    // stack; give those rejections the same connection semantics.
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    response
}
