//! # Request Handlers
//!
//! HTTP handlers bridging the API layer with the OAuth proxy service.
//! Each handler extracts and validates its inputs, delegates to
//! [`crate::service::OAuthProxyService`], and shapes the HTTP response.
//!
//! All errors are [`shared::errors::ApiError`] values and convert to the
//! canonical `{error, error_description}` bodies automatically.
//!
//! ## Redirects
//!
//! The authorization dance uses 302 Found exclusively (what deployed MCP
//! hosts expect); axum's `Redirect` helpers emit 303/307, so the handlers
//! build the response explicitly.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde_json::json;
use shared::errors::ApiError;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::api::dto::{
    AuthorizeQuery, CallbackQuery, ClientRegistrationResponse, ConsentForm, ConsentQuery,
    DynamicClientRegistrationRequest, TokenRequest,
};
use crate::pages;
use crate::service::secrets::{constant_time_eq, urlsafe_token};
use crate::AppState;

/// Session cookie holding the consent CSRF token.
const CSRF_COOKIE: &str = "csrf_token";

/// 302 Found to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn csrf_cookie(value: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// OAuth 2.0 Authorization Server Metadata (RFC 8414).
///
/// # Route
///
/// `GET /.well-known/oauth-authorization-server`
///
/// Every URI points at the proxy's public interface; MCP clients interact
/// only with these endpoints and never learn about the upstream provider.
pub async fn oauth_authorization_server(State(state): State<AppState>) -> Json<serde_json::Value> {
    debug!("Serving OAuth authorization server metadata");
    let base = state.config.public_base();

    Json(json!({
        "issuer": format!("{}/", base),
        "authorization_endpoint": format!("{}/authorize", base),
        "token_endpoint": format!("{}/token", base),
        "registration_endpoint": format!("{}/register", base),
        "scopes_supported": ["ZohoAnalytics.fullaccess.all", "offline_access"],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "revocation_endpoint": format!("{}/revoke", base),
        "revocation_endpoint_auth_methods_supported": ["client_secret_post"],
        "code_challenge_methods_supported": ["S256"]
    }))
}

/// Protected Resource Metadata (RFC 9728).
///
/// # Route
///
/// `GET /.well-known/oauth-protected-resource`
pub async fn oauth_protected_resource(State(state): State<AppState>) -> Json<serde_json::Value> {
    debug!("Serving OAuth protected resource metadata");
    let base = state.config.public_base();

    Json(json!({
        "resource": format!("{}/mcp", base),
        "authorization_servers": [format!("{}/", base)],
        "scopes_supported": ["ZohoAnalytics.fullaccess.all"],
        "bearer_methods_supported": ["header"]
    }))
}

// =============================================================================
// DYNAMIC CLIENT REGISTRATION
// =============================================================================

/// Dynamic Client Registration endpoint.
///
/// # Route
///
/// `POST /register`
///
/// The upstream provider supports static registration only, so the proxy
/// answers DCR requests itself with freshly minted credentials. Responds
/// 200 (not 201) by contract with existing MCP hosts.
pub async fn register_client(
    State(state): State<AppState>,
    Json(payload): Json<DynamicClientRegistrationRequest>,
) -> Result<Json<ClientRegistrationResponse>, ApiError> {
    payload.validate()?;

    let response = state.oauth.register_client(payload).await?;
    Ok(Json(response))
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Authorization endpoint (initial step of the code grant).
///
/// # Route
///
/// `GET /authorize?client_id=..&redirect_uri=..[&scope&state&code_challenge&code_challenge_method]`
///
/// # Responses
///
/// - **302**: to `/consent?transaction_id=<txn>`
/// - **401**: unknown `client_id` (static recovery page)
/// - **400** `invalid_redirect_uri`: redirect target not registered
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, ApiError> {
    let Some(client) = state.oauth.find_client(&query.client_id).await? else {
        warn!(client_id = %query.client_id, "Authorization request with unknown client_id");
        return Ok((StatusCode::UNAUTHORIZED, Html(pages::INVALID_TOKEN_HTML)).into_response());
    };

    let consent_url = state
        .oauth
        .begin_authorization(
            &client,
            &query.redirect_uri,
            &query.scope,
            query.state,
            query.code_challenge,
            query.code_challenge_method,
        )
        .await?;

    debug!("Redirecting to consent page");
    Ok(found(&consent_url))
}

// =============================================================================
// CONSENT
// =============================================================================

/// Consent page.
///
/// # Route
///
/// `GET /consent?transaction_id=<txn>`
///
/// Renders the approval form with hidden `transaction_id` and
/// `csrf_token` fields. The CSRF token is minted once per session cookie
/// and reused while the cookie lives.
pub async fn consent(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<ConsentQuery>,
) -> Result<Response, ApiError> {
    debug!(transaction_id = %query.transaction_id, "Consent page requested");

    let transaction = state
        .oauth
        .load_valid_transaction(&query.transaction_id)
        .await?;

    let (jar, csrf_token) = match jar.get(CSRF_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => {
            let token = cookie.value().to_string();
            (jar, token)
        }
        _ => {
            let token = urlsafe_token(32);
            (jar.add(csrf_cookie(token.clone())), token)
        }
    };

    Ok((jar, Html(pages::consent_page(&transaction, &csrf_token))).into_response())
}

/// Compares the submitted CSRF token with the session token.
///
/// Any mismatch clears the session token before rejecting, forcing the
/// next consent render to mint a fresh one.
fn validate_csrf(
    jar: SignedCookieJar,
    submitted: &str,
) -> Result<SignedCookieJar, (SignedCookieJar, ApiError)> {
    let valid = jar
        .get(CSRF_COOKIE)
        .map(|cookie| {
            !cookie.value().is_empty()
                && !submitted.is_empty()
                && constant_time_eq(cookie.value(), submitted)
        })
        .unwrap_or(false);

    if valid {
        Ok(jar)
    } else {
        Err((jar.remove(csrf_cookie(String::new())), ApiError::InvalidCsrf))
    }
}

/// Consent approval.
///
/// # Route
///
/// `POST /consent/approve` (form: `transaction_id`, `csrf_token`)
///
/// # Responses
///
/// - **302**: to the upstream authorize endpoint with the transaction id
///   as `state`
/// - **403**: CSRF token mismatch (session token cleared)
/// - **400** `invalid_transaction` / `transaction_expired`
pub async fn approve_consent(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<ConsentForm>,
) -> Result<Response, ApiError> {
    let jar = match validate_csrf(jar, &form.csrf_token) {
        Ok(jar) => jar,
        Err((jar, error)) => {
            warn!(transaction_id = %form.transaction_id, "CSRF validation failed on consent approval");
            return Ok((jar, error).into_response());
        }
    };

    info!(transaction_id = %form.transaction_id, "User approved consent");

    let transaction = state
        .oauth
        .load_valid_transaction(&form.transaction_id)
        .await?;
    let upstream_url = state.oauth.upstream_consent_url(&transaction)?;

    info!(transaction_id = %form.transaction_id, "Redirecting user to upstream authorization endpoint");
    Ok((jar, found(&upstream_url)).into_response())
}

/// Consent denial.
///
/// # Route
///
/// `POST /consent/deny` (form: `transaction_id`, `csrf_token`)
///
/// Consumes the transaction and sends the user agent back to the client
/// with `error=access_denied` and the client's original `state`.
pub async fn deny_consent(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<ConsentForm>,
) -> Result<Response, ApiError> {
    let jar = match validate_csrf(jar, &form.csrf_token) {
        Ok(jar) => jar,
        Err((jar, error)) => {
            warn!(transaction_id = %form.transaction_id, "CSRF validation failed on consent denial");
            return Ok((jar, error).into_response());
        }
    };

    let redirect = state.oauth.deny_authorization(&form.transaction_id).await?;
    Ok((jar, found(&redirect)).into_response())
}

// =============================================================================
// CALLBACK
// =============================================================================

/// Upstream callback (code brokerage).
///
/// # Route
///
/// `GET /auth/callback?code=<upstream>&state=<txn>[&location=..]`
///
/// The registered redirect URI at the upstream provider. Validates the
/// transaction carried in `state`, stores the upstream code under a
/// freshly minted proxy code, and redirects to the client's original
/// `redirect_uri` with `code=<proxy code>` and the client's `state`.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let redirect = state
        .oauth
        .complete_callback(&query.code, &query.state, query.location)
        .await?;

    debug!("Redirecting to client callback URI");
    Ok(found(&redirect))
}

// =============================================================================
// TOKEN
// =============================================================================

/// Token endpoint (final step of the code grant).
///
/// # Route
///
/// `POST /token` (form: `grant_type`, `client_id`, `client_secret`, plus
/// `code`/`code_verifier` or `refresh_token`)
///
/// # Responses
///
/// - **200**: the upstream token document, verbatim
/// - **401** `invalid_client`: unknown client or secret mismatch
/// - **400** `invalid_grant` / `invalid_request` / `unsupported_grant_type`
/// - **502** `upstream_token_exchange_failed`
pub async fn token_exchange(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tokens = state.oauth.exchange_token(request).await?;
    Ok(Json(tokens))
}

/// Revocation stub.
///
/// # Route
///
/// `POST /revoke`
///
/// Advertised in discovery for client compatibility; upstream revocation
/// is not brokered, so this acknowledges and does nothing.
pub async fn revoke() -> Json<serde_json::Value> {
    Json(json!({}))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, test_state};

    #[tokio::test]
    async fn test_authorization_server_metadata_points_at_the_proxy() {
        let state = test_state(test_config());
        let Json(metadata) = oauth_authorization_server(State(state)).await;

        assert_eq!(metadata["issuer"], "https://proxy.test/");
        assert_eq!(metadata["authorization_endpoint"], "https://proxy.test/authorize");
        assert_eq!(metadata["token_endpoint"], "https://proxy.test/token");
        assert_eq!(metadata["registration_endpoint"], "https://proxy.test/register");
        assert_eq!(metadata["revocation_endpoint"], "https://proxy.test/revoke");
        assert_eq!(metadata["code_challenge_methods_supported"][0], "S256");
        assert_eq!(metadata["token_endpoint_auth_methods_supported"][0], "client_secret_post");
    }

    #[tokio::test]
    async fn test_protected_resource_metadata() {
        let state = test_state(test_config());
        let Json(metadata) = oauth_protected_resource(State(state)).await;

        assert_eq!(metadata["resource"], "https://proxy.test/mcp");
        assert_eq!(metadata["authorization_servers"][0], "https://proxy.test/");
        assert_eq!(metadata["bearer_methods_supported"][0], "header");
    }

    #[test]
    fn test_found_builds_a_302() {
        let response = found("https://c/cb?code=x");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://c/cb?code=x"
        );
    }
}
