//! # Application Error Types
//!
//! Unified error handling for the OAuth proxy with automatic HTTP conversion.
//!
//! ## Design Philosophy
//!
//! Every error a handler can produce maps to exactly one canonical OAuth
//! error code and one HTTP status, so downstream MCP clients always see a
//! consistent `{error, error_description}` body.
//!
//! ## Error Categories
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           ApiError Categories                            │
//! ├───────────────────────┬──────────────────────┬───────────────────────────┤
//! │ Authentication (401)  │ Consent (403)        │ Grant / Input (400)       │
//! ├───────────────────────┼──────────────────────┼───────────────────────────┤
//! │ Unauthorized          │ InvalidCsrf          │ InvalidRequest            │
//! │ InvalidToken          │                      │ InvalidGrant              │
//! │ InvalidClient         │                      │ InvalidRedirectUri        │
//! │                       │                      │ InvalidTransaction        │
//! │                       │                      │ TransactionExpired        │
//! │                       │                      │ UnsupportedGrantType      │
//! │                       │                      │ ValidationError           │
//! ├───────────────────────┴──────────────────────┴───────────────────────────┤
//! │ Rate Limit (429)      │ Upstream (502)       │ Server (500)              │
//! ├───────────────────────┼──────────────────────┼───────────────────────────┤
//! │ TooManyRequests       │ UpstreamExchange-    │ RedisError                │
//! │                       │ Failed               │ Storage                   │
//! │                       │                      │ Internal                  │
//! └───────────────────────┴──────────────────────┴───────────────────────────┘
//! ```
//!
//! ## HTTP Response Format
//!
//! All errors serialize to the wire shape the OAuth endpoints promise:
//!
//! ```json
//! {
//!   "error": "invalid_grant",
//!   "error_description": "invalid or expired authorization grant"
//! }
//! ```
//!
//! `invalid_client` additionally carries a `help_url` pointing at the
//! static recovery page, instructing the MCP host to clear its cached
//! credentials.
//!
//! ## Security
//!
//! Server-side failures (Redis, remote cache, upstream transport) are
//! logged with their real cause but surface only a generic description —
//! upstream credentials and backend details never reach a response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status and OAuth code mapping.
///
/// Each variant represents a specific failure and maps to one HTTP status
/// code plus one canonical error code. The `#[error]` attribute defines the
/// `error_description` sent to clients.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================
    // Produced by the bearer middleware, which also attaches the
    // WWW-Authenticate header pointing at the protected-resource metadata.

    /// Authorization header missing or syntactically unusable.
    /// Returns 401 Unauthorized with code `unauthorized`.
    #[error("{detail}")]
    Unauthorized {
        /// Human-readable reason (e.g. "Missing Authorization header")
        detail: String,
    },

    /// Bearer token rejected by the upstream probe, or malformed.
    /// All probe failures flatten here so upstream status codes never leak.
    /// Returns 401 Unauthorized with code `invalid_token`.
    #[error("{detail}")]
    InvalidToken {
        /// Human-readable reason (e.g. "Invalid or expired token")
        detail: String,
    },

    /// Unknown client_id or client_secret mismatch at the token endpoint.
    /// The body tells the MCP host how to recover: its cached registration
    /// has expired, so it must clear credentials and re-register.
    /// Returns 401 Unauthorized with code `invalid_client`.
    #[error(
        "The registered client has expired or is invalid. \
         Clear cached MCP credentials and re-authenticate."
    )]
    InvalidClient {
        /// Link to the static recovery page served under /static/
        help_url: String,
    },

    // =========================================================================
    // Consent Errors (403 Forbidden)
    // =========================================================================

    /// CSRF token from the consent form does not match the session token.
    /// The session token is cleared before this is returned.
    /// Returns 403 Forbidden.
    #[error("Invalid CSRF token")]
    InvalidCsrf,

    // =========================================================================
    // Grant / Input Errors (400 Bad Request)
    // =========================================================================

    /// Malformed or incomplete request (bad PKCE verifier shape, missing
    /// grant fields, unusable client IP, ...).
    /// Returns 400 Bad Request with code `invalid_request`.
    #[error("{detail}")]
    InvalidRequest {
        /// What is wrong with the request
        detail: String,
    },

    /// Authorization code unknown, expired, bound to another client, or
    /// failing PKCE verification.
    /// Returns 400 Bad Request with code `invalid_grant`.
    #[error("invalid or expired authorization grant")]
    InvalidGrant,

    /// `redirect_uri` is not in the client's registered list.
    /// Returns 400 Bad Request with code `invalid_redirect_uri`.
    #[error("redirect_uri is not registered for this client")]
    InvalidRedirectUri,

    /// The consent/callback transaction id does not exist.
    /// Returns 400 Bad Request with code `invalid_transaction`.
    #[error("invalid or unknown transaction")]
    InvalidTransaction,

    /// The transaction exists but its `expires_at` has passed; the caller
    /// deletes the stale entry before returning this.
    /// Returns 400 Bad Request with code `transaction_expired`.
    #[error("the authorization transaction has expired")]
    TransactionExpired,

    /// `grant_type` is neither `authorization_code` nor `refresh_token`.
    /// Returns 400 Bad Request with code `unsupported_grant_type`.
    #[error("unsupported grant type")]
    UnsupportedGrantType,

    /// Registration payload failed declarative validation.
    /// Returns 400 Bad Request with code `invalid_request`.
    #[error("request validation failed")]
    ValidationError(#[from] ValidationErrors),

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// Token bucket for the caller's key is empty.
    /// Returns 429 Too Many Requests.
    #[error("Rate limit exceeded. Try again later.")]
    TooManyRequests,

    // =========================================================================
    // Upstream Errors (502 Bad Gateway)
    // =========================================================================

    /// The upstream provider's token endpoint was unreachable, timed out,
    /// or answered non-2xx. The real cause is logged; the body stays generic.
    /// Returns 502 Bad Gateway with code `upstream_token_exchange_failed`.
    #[error("upstream token exchange failed")]
    UpstreamExchangeFailed,

    // =========================================================================
    // Server Errors (500 Internal Server Error)
    // =========================================================================
    // Logged as errors; details are never exposed to clients.

    /// Redis operation failed. Wraps `redis::RedisError`.
    #[error("storage backend error")]
    RedisError(#[from] redis::RedisError),

    /// Remote-cache (Catalyst) or serialization failure inside a store.
    #[error("storage backend error")]
    Storage {
        /// Internal message for logging (not exposed to the client)
        message: String,
    },

    /// Unspecified internal error. Last resort.
    #[error("internal server error")]
    Internal {
        /// Internal message for logging (not exposed to the client)
        message: String,
    },
}

// =============================================================================
// Error Methods
// =============================================================================

impl ApiError {
    /// Returns the canonical machine-readable error code.
    ///
    /// These codes are the wire contract with MCP hosts; they follow the
    /// OAuth convention of lowercase snake_case.
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidToken { .. } => "invalid_token",
            Self::InvalidClient { .. } => "invalid_client",
            // Consent
            Self::InvalidCsrf => "invalid_request",
            // Grant / input
            Self::InvalidRequest { .. } | Self::ValidationError(_) => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::InvalidTransaction => "invalid_transaction",
            Self::TransactionExpired => "transaction_expired",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            // Rate limiting
            Self::TooManyRequests => "too_many_requests",
            // Upstream
            Self::UpstreamExchangeFailed => "upstream_token_exchange_failed",
            // Server
            Self::RedisError(_) | Self::Storage { .. } => "storage_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } | Self::InvalidToken { .. } | Self::InvalidClient { .. } => {
                StatusCode::UNAUTHORIZED
            }

            Self::InvalidCsrf => StatusCode::FORBIDDEN,

            Self::InvalidRequest { .. }
            | Self::InvalidGrant
            | Self::InvalidRedirectUri
            | Self::InvalidTransaction
            | Self::TransactionExpired
            | Self::UnsupportedGrantType
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,

            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            Self::UpstreamExchangeFailed => StatusCode::BAD_GATEWAY,

            Self::RedisError(_) | Self::Storage { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level with their real cause;
    /// client errors (4xx) are logged at WARN level by the handlers that
    /// produce them.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::RedisError(_)
                | Self::Storage { .. }
                | Self::Internal { .. }
                | Self::UpstreamExchangeFailed
        )
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Standard OAuth error response body.
///
/// All error responses serialize to this shape for consistency with
/// RFC 6749 error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Canonical error code (e.g. "invalid_grant")
    pub error: String,

    /// Human-readable description of the failure
    pub error_description: String,

    /// Recovery link; only present on `invalid_client`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
}

impl ErrorBody {
    /// Creates the wire body for an `ApiError`.
    pub fn new(error: &ApiError) -> Self {
        let help_url = match error {
            ApiError::InvalidClient { help_url } => Some(help_url.clone()),
            _ => None,
        };

        Self {
            error: error.error_code().to_string(),
            error_description: error.to_string(),
            help_url,
        }
    }
}

// =============================================================================
// Axum Integration
// =============================================================================

/// Allows returning `ApiError` directly from handlers:
///
/// ```rust,ignore
/// async fn handler() -> Result<Json<Value>, ApiError> {
///     Err(ApiError::InvalidGrant)
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Real causes of 5xx-class failures are only visible in logs.
        match &self {
            ApiError::RedisError(e) => {
                tracing::error!(error = %e, "Redis operation failed");
            }
            ApiError::Storage { message } => {
                tracing::error!(error = %message, "Storage backend failed");
            }
            ApiError::Internal { message } => {
                tracing::error!(error = %message, "Internal error");
            }
            _ => {}
        }

        let status = self.status_code();
        let body = ErrorBody::new(&self);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
