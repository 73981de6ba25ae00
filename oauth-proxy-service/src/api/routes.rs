//! # Route Configuration
//!
//! Assembles the router and its middleware stack.
//!
//! ## Route Structure
//!
//! ```text
//! /
//! ├── /                                    GET  → static landing page
//! ├── /favicon.ico                         GET  → static asset
//! ├── /static/*                            GET  → static assets
//! ├── /.well-known/
//! │   ├── oauth-authorization-server       GET  → discovery metadata
//! │   └── oauth-protected-resource         GET  → resource metadata
//! ├── /register                            POST → dynamic client registration
//! ├── /authorize                           GET  → start authorization
//! ├── /consent                             GET  → consent page
//! ├── /consent/approve                     POST → approve → upstream redirect
//! ├── /consent/deny                        POST → deny → client redirect
//! ├── /auth/callback                       GET  → upstream callback
//! ├── /token                               POST → token exchange
//! └── /revoke                              POST → revocation stub
//! ```
//!
//! ## Middleware Stack (outermost first)
//!
//! 1. Request tracing
//! 2. Body-size guard (Content-Length precheck + 413 stamping)
//! 3. Bearer validator (exempt paths pass through)
//! 4. Global rate limiter (keyed by client IP)
//! 5. Router, with per-route limiters on `/register` and `/token`
//!    (keyed `<path>:<client_ip>`) and the request-body limit applied at
//!    the extractor boundary.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::middleware::rate_limit::RouteLimit;
use crate::middleware::{bearer, body_limit, rate_limit};
use crate::AppState;

/// Burst budget for the abuse-attractive endpoints.
const ROUTE_LIMIT: RouteLimit = RouteLimit { capacity: 20, window_seconds: 60 };

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    let register_limiter =
        from_fn_with_state((state.clone(), ROUTE_LIMIT), rate_limit::route_rate_limit);
    let token_limiter =
        from_fn_with_state((state.clone(), ROUTE_LIMIT), rate_limit::route_rate_limit);

    Router::new()
        .route_service("/", ServeFile::new("static/index.html"))
        .route_service("/favicon.ico", ServeFile::new("static/favicon.ico"))
        .route(
            "/.well-known/oauth-authorization-server",
            get(handlers::oauth_authorization_server),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(handlers::oauth_protected_resource),
        )
        .route("/register", post(handlers::register_client).layer(register_limiter))
        .route("/authorize", get(handlers::authorize))
        .route("/consent", get(handlers::consent))
        .route("/consent/approve", post(handlers::approve_consent))
        .route("/consent/deny", post(handlers::deny_consent))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/token", post(handlers::token_exchange).layer(token_limiter))
        .route("/revoke", post(handlers::revoke))
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), body_limit::enforce_max_body_size))
                .layer(from_fn_with_state(state.clone(), bearer::require_bearer))
                .layer(from_fn_with_state(state.clone(), rate_limit::global_rate_limit)),
        )
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_size))
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
// Router-level tests drive the full middleware stack with
// `tower::ServiceExt::oneshot`; the upstream provider is a wiremock
// server and the bearer probe a mock.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AuthorizationTransaction;
    use crate::middleware::bearer::MockTokenValidator;
    use crate::test_support::{test_config, test_state, test_state_with_validator};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use shared::errors::ApiError;
    use sha2::{Digest, Sha256};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk4FWFOEjXk";

    fn s256_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Stamps a socket peer onto the request the way
    /// `into_make_service_with_connect_info` would.
    fn with_peer(mut request: Request<Body>) -> Request<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 40000))));
        request
    }

    fn get_request(uri: &str) -> Request<Body> {
        with_peer(Request::builder().uri(uri).body(Body::empty()).unwrap())
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        with_peer(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
    }

    fn form_request(uri: &str, body: String, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie.to_string());
        }
        with_peer(builder.body(Body::from(body)).unwrap())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &axum::response::Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .expect("missing Location header")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn between<'a>(haystack: &'a str, prefix: &str, terminator: char) -> &'a str {
        let start = haystack.find(prefix).expect("prefix not found") + prefix.len();
        let rest = &haystack[start..];
        match rest.find(terminator) {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    async fn register_client(app: &Router, redirect_uri: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(json_request(
                "/register",
                serde_json::json!({ "redirect_uris": [redirect_uri], "client_name": "Test Host" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        (
            body["client_id"].as_str().unwrap().to_string(),
            body["client_secret"].as_str().unwrap().to_string(),
        )
    }

    /// Walks register → authorize → consent → approve → callback and
    /// returns (client_id, client_secret, proxy_code, csrf cookie).
    async fn authorize_through_callback(
        app: &Router,
        challenge: &str,
    ) -> (String, String, String) {
        let (client_id, client_secret) = register_client(app, "https://c/cb").await;

        // /authorize → 302 to /consent?transaction_id=T
        let authorize_uri = format!(
            "/authorize?client_id={client_id}&redirect_uri=https%3A%2F%2Fc%2Fcb&scope=s&state=xyz&code_challenge={challenge}&code_challenge_method=S256"
        );
        let response = app.clone().oneshot(get_request(&authorize_uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let consent_url = location(&response);
        let transaction_id = between(&consent_url, "transaction_id=", '&').to_string();

        // /consent → 200 HTML with hidden fields + CSRF cookie
        let consent_path = consent_url
            .strip_prefix("https://proxy.test")
            .unwrap()
            .to_string();
        let response = app.clone().oneshot(get_request(&consent_path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("consent must set the session cookie")
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let html = body_string(response).await;
        assert!(html.contains(&format!(r#"name="transaction_id" value="{transaction_id}""#)));
        let csrf_token = between(&html, r#"name="csrf_token" value=""#, '"').to_string();

        // /consent/approve → 302 to the upstream authorize URL
        let response = app
            .clone()
            .oneshot(form_request(
                "/consent/approve",
                format!("transaction_id={transaction_id}&csrf_token={csrf_token}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let upstream_url = location(&response);
        assert!(upstream_url.contains("/oauth/v2/auth?"));
        assert!(upstream_url.contains(&format!("state={transaction_id}")));
        assert!(upstream_url.contains("access_type=offline"));
        assert!(!upstream_url.contains("code_challenge"));

        // upstream redirects back → /auth/callback → 302 to the client
        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/auth/callback?code=UCODE&state={transaction_id}"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let client_redirect = location(&response);
        assert!(client_redirect.starts_with("https://c/cb?code="));
        assert!(client_redirect.ends_with("&state=xyz"));
        let proxy_code = between(&client_redirect, "code=", '&').to_string();

        (client_id, client_secret, proxy_code)
    }

    fn token_form(
        client_id: &str,
        client_secret: &str,
        code: &str,
        verifier: &str,
    ) -> String {
        format!(
            "grant_type=authorization_code&client_id={client_id}&client_secret={client_secret}&code={code}&code_verifier={verifier}"
        )
    }

    // =========================================================================
    // End-to-end authorization flow
    // =========================================================================

    #[tokio::test]
    async fn test_full_authorization_flow_and_single_use_code() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=UCODE"))
            .and(body_string_contains("client_id=static-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "upstream-access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "upstream-refresh",
                "scope": "s"
            })))
            .expect(1)
            .mount(&upstream)
            .await;

        let mut config = test_config();
        config.oidc.base_url = upstream.uri();
        let app = build_router(test_state(config));

        let challenge = s256_challenge(VERIFIER);
        let (client_id, client_secret, proxy_code) =
            authorize_through_callback(&app, &challenge).await;

        // /token redeems the proxy code for the upstream tokens, verbatim
        let response = app
            .clone()
            .oneshot(form_request(
                "/token",
                token_form(&client_id, &client_secret, &proxy_code, VERIFIER),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tokens = body_json(response).await;
        assert_eq!(tokens["access_token"], "upstream-access");
        assert_eq!(tokens["refresh_token"], "upstream-refresh");

        // The code is single-use: a replay is invalid_grant
        let response = app
            .clone()
            .oneshot(form_request(
                "/token",
                token_form(&client_id, &client_secret, &proxy_code, VERIFIER),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_pkce_mismatch_is_invalid_grant() {
        let app = build_router(test_state(test_config()));

        let challenge = s256_challenge(VERIFIER);
        let (client_id, client_secret, proxy_code) =
            authorize_through_callback(&app, &challenge).await;

        // A well-formed verifier whose hash does not match the challenge
        let wrong_verifier = "A".repeat(43);
        let response = app
            .clone()
            .oneshot(form_request(
                "/token",
                token_form(&client_id, &client_secret, &proxy_code, &wrong_verifier),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_wrong_client_secret_is_invalid_client_with_help() {
        let app = build_router(test_state(test_config()));
        let (client_id, _secret) = register_client(&app, "https://c/cb").await;

        let response = app
            .clone()
            .oneshot(form_request(
                "/token",
                token_form(&client_id, "not-the-secret", "whatever", VERIFIER),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_client");
        assert_eq!(
            body["help_url"],
            "https://proxy.test/static/invalid_token.html"
        );
    }

    #[tokio::test]
    async fn test_unknown_client_gets_the_invalid_token_page() {
        let app = build_router(test_state(test_config()));

        let response = app
            .clone()
            .oneshot(get_request(
                "/authorize?client_id=ghost&redirect_uri=https%3A%2F%2Fc%2Fcb",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let html = body_string(response).await;
        assert!(html.contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_unregistered_redirect_uri_is_rejected() {
        let app = build_router(test_state(test_config()));
        let (client_id, _secret) = register_client(&app, "https://c/cb").await;

        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/authorize?client_id={client_id}&redirect_uri=https%3A%2F%2Fevil%2Fcb"
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_redirect_uri");
    }

    // =========================================================================
    // Consent edge cases
    // =========================================================================

    #[tokio::test]
    async fn test_consent_with_unknown_transaction() {
        let app = build_router(test_state(test_config()));

        let response = app
            .clone()
            .oneshot(get_request("/consent?transaction_id=ghost"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_transaction");
    }

    #[tokio::test]
    async fn test_consent_with_expired_transaction() {
        let state = test_state(test_config());
        let app = build_router(state.clone());

        // Plant a transaction whose expires_at is already in the past.
        let now = Utc::now();
        let stale = AuthorizationTransaction {
            transaction_id: "stale-txn".into(),
            client_id: "client-1".into(),
            redirect_uri: "https://c/cb".into(),
            scope: "s".into(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
            created_at: now - chrono::Duration::seconds(121),
            expires_at: now - chrono::Duration::seconds(1),
        };
        state
            .oauth
            .transactions
            .set("stale-txn", &stale, None)
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/consent?transaction_id=stale-txn"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "transaction_expired");
    }

    #[tokio::test]
    async fn test_csrf_mismatch_is_forbidden() {
        let app = build_router(test_state(test_config()));
        let (client_id, _secret) = register_client(&app, "https://c/cb").await;

        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/authorize?client_id={client_id}&redirect_uri=https%3A%2F%2Fc%2Fcb"
            )))
            .await
            .unwrap();
        let consent_url = location(&response);
        let transaction_id = between(&consent_url, "transaction_id=", '&').to_string();

        let consent_path = consent_url.strip_prefix("https://proxy.test").unwrap();
        let response = app.clone().oneshot(get_request(consent_path)).await.unwrap();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        // Valid session cookie, wrong form token
        let response = app
            .clone()
            .oneshot(form_request(
                "/consent/approve",
                format!("transaction_id={transaction_id}&csrf_token=forged"),
                Some(&cookie),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["error_description"],
            "Invalid CSRF token"
        );
    }

    #[tokio::test]
    async fn test_consent_deny_redirects_with_access_denied() {
        let app = build_router(test_state(test_config()));
        let (client_id, _secret) = register_client(&app, "https://c/cb").await;

        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/authorize?client_id={client_id}&redirect_uri=https%3A%2F%2Fc%2Fcb&state=xyz"
            )))
            .await
            .unwrap();
        let consent_url = location(&response);
        let transaction_id = between(&consent_url, "transaction_id=", '&').to_string();

        let consent_path = consent_url.strip_prefix("https://proxy.test").unwrap();
        let response = app.clone().oneshot(get_request(consent_path)).await.unwrap();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let html = body_string(response).await;
        let csrf_token = between(&html, r#"name="csrf_token" value=""#, '"').to_string();

        let response = app
            .clone()
            .oneshot(form_request(
                "/consent/deny",
                format!("transaction_id={transaction_id}&csrf_token={csrf_token}"),
                Some(&cookie),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let redirect = location(&response);
        assert!(redirect.starts_with("https://c/cb?error=access_denied"));
        assert!(redirect.contains("state=xyz"));

        // The transaction was consumed by the denial.
        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/consent?transaction_id={transaction_id}"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // =========================================================================
    // Bearer middleware
    // =========================================================================

    #[tokio::test]
    async fn test_protected_path_requires_bearer() {
        let app = build_router(test_state(test_config()));

        let response = app.clone().oneshot(get_request("/mcp")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(challenge.contains(
            "resource_metadata=\"https://proxy.test/.well-known/oauth-protected-resource\""
        ));
        assert_eq!(body_json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_rejected_probe_is_invalid_token() {
        let mut probe = MockTokenValidator::new();
        probe
            .expect_validate_token()
            .returning(|_| Err(ApiError::InvalidToken { detail: "expired".into() }));

        let app = build_router(test_state_with_validator(test_config(), Arc::new(probe)));

        let mut request = get_request("/mcp");
        request.headers_mut().insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_static("Bearer stale-token"),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_valid_bearer_passes_through() {
        let mut probe = MockTokenValidator::new();
        probe
            .expect_validate_token()
            .withf(|token| token == "live-token")
            .returning(|_| Ok(()));

        let app = build_router(test_state_with_validator(test_config(), Arc::new(probe)));

        let mut request = get_request("/mcp");
        request.headers_mut().insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_static("Bearer live-token"),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        // Authenticated but unrouted: the 404 proves the middleware let
        // the request through.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_scheme_is_rejected() {
        let app = build_router(test_state(test_config()));

        let mut request = get_request("/mcp");
        request.headers_mut().insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // =========================================================================
    // Body-size guard
    // =========================================================================

    #[tokio::test]
    async fn test_oversized_content_length_is_rejected_early() {
        let app = build_router(test_state(test_config()));

        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, "2000000")
                .body(Body::empty())
                .unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_malformed_content_length_is_bad_request() {
        let app = build_router(test_state(test_config()));

        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_LENGTH, "not-a-number")
                .body(Body::empty())
                .unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_streamed_body_is_rejected() {
        let app = build_router(test_state(test_config()));

        // No Content-Length header: the request-body limit trips while
        // the JSON extractor reads the stream.
        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(vec![b'x'; 2_000_000]))
                .unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_reasonable_body_passes() {
        let app = build_router(test_state(test_config()));
        let (_client_id, _secret) = register_client(&app, "https://c/cb").await;
    }

    // =========================================================================
    // Rate limiting
    // =========================================================================

    #[tokio::test]
    async fn test_global_rate_limit_denies_over_capacity() {
        let mut config = test_config();
        config.limits.rate_limit_capacity = 2;
        config.limits.rate_limit_window_seconds = 60;
        let app = build_router(test_state(config));

        let uri = "/.well-known/oauth-protected-resource";
        for _ in 0..2 {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_request_without_peer_address_is_rejected() {
        let app = build_router(test_state(test_config()));

        // No ConnectInfo extension: the limiter cannot attribute the
        // request to anyone.
        let request = Request::builder()
            .uri("/.well-known/oauth-protected-resource")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // =========================================================================
    // Misc surface
    // =========================================================================

    #[tokio::test]
    async fn test_revoke_stub_answers_200() {
        let app = build_router(test_state(test_config()));

        let response = app
            .clone()
            .oneshot(with_peer(
                Request::builder()
                    .method("POST")
                    .uri("/revoke")
                    .body(Body::empty())
                    .unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_discovery_is_exempt_from_bearer_auth() {
        let mut probe = MockTokenValidator::new();
        // Never called for exempt paths.
        probe.expect_validate_token().times(0);

        let app = build_router(test_state_with_validator(test_config(), Arc::new(probe)));
        let response = app
            .clone()
            .oneshot(get_request("/.well-known/oauth-authorization-server"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let metadata = body_json(response).await;
        assert_eq!(metadata["issuer"], "https://proxy.test/");
    }
}
