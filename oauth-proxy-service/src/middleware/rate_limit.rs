//! # Rate-Limit Middleware
//!
//! Two flavors over the same limiter registry:
//!
//! - a **global** limiter keyed by client IP, mounted across the whole
//!   router for protective purposes;
//! - **per-route** limiters keyed `<path>:<client_ip>`, attached to the
//!   endpoints most attractive to abuse (`/register`, `/token`).
//!
//! A request whose client IP cannot be determined is rejected with 400 —
//! admitting it would give unattributable traffic an unlimited budget.
//! A limiter backend failure fails open: availability beats strictness
//! for a protective limit, and the error is logged.

use crate::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use shared::errors::ApiError;
use shared::rate_limit::client_ip;
use std::net::SocketAddr;
use tracing::{error, warn};

/// Capacity/window pair for a per-route bucket.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimit {
    pub capacity: u32,
    pub window_seconds: u64,
}

fn extract_client_ip(state: &AppState, request: &Request) -> Option<String> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    client_ip(
        peer,
        request.headers(),
        state.config.proxy.behind_proxy,
        &state.trusted_proxies,
    )
}

async fn admit(state: &AppState, capacity: u32, window_seconds: u64, key: &str) -> Option<Response> {
    let limiter = state.limiters.get_or_build(capacity, window_seconds).await;

    match limiter.allow(key).await {
        Ok(true) => None,
        Ok(false) => {
            warn!(%key, "Rate limit exceeded");
            Some(ApiError::TooManyRequests.into_response())
        }
        Err(e) => {
            // Fail open: a broken limiter backend must not take the
            // service down with it.
            error!(error = %e, "Rate limiter backend error; admitting request");
            None
        }
    }
}

/// Global IP-keyed rate limit.
pub async fn global_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&state, &request) else {
        warn!("Could not determine client IP for rate limiting");
        return ApiError::InvalidRequest {
            detail: "Unable to determine client IP for rate limiting.".into(),
        }
        .into_response();
    };

    let capacity = state.config.limits.rate_limit_capacity;
    let window = state.config.limits.rate_limit_window_seconds;

    if let Some(rejection) = admit(&state, capacity, window, &ip).await {
        return rejection;
    }

    next.run(request).await
}

/// Per-route rate limit keyed by `<path>:<client_ip>`.
pub async fn route_rate_limit(
    State((state, limit)): State<(AppState, RouteLimit)>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&state, &request) else {
        warn!("Could not determine client IP for rate limiting");
        return ApiError::InvalidRequest {
            detail: "Unable to determine client IP for rate limiting.".into(),
        }
        .into_response();
    };

    let key = format!("{}:{}", request.uri().path(), ip);

    if let Some(rejection) = admit(&state, limit.capacity, limit.window_seconds, &key).await {
        return rejection;
    }

    next.run(request).await
}
