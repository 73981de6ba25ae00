//! # Analytics MCP OAuth Proxy
//!
//! An OAuth 2.1 authorization-server proxy that fronts an upstream
//! identity provider supporting only **static** client registration, and
//! exposes a fully **Dynamic Client Registration** (DCR) surface to MCP
//! host applications (Cursor, Claude Desktop, ...).
//!
//! ## Why a proxy?
//!
//! 1. **Provider constraint**: the upstream accounts server offers no DCR
//!    endpoints — one client id/secret pair was registered manually.
//! 2. **Client dependency**: MCP hosts rely exclusively on DCR for
//!    onboarding.
//!
//! The proxy bridges the two: it intercepts `/register` and answers with
//! locally minted credentials, while the single pre-registered upstream
//! client performs the actual upstream operations. The static credentials
//! never reach a downstream client, response body, redirect, or log line.
//!
//! ## Request Flow (authorization-code grant)
//!
//! ```text
//! client ──▶ POST /register            mint client_id/secret (24 h TTL)
//! client ──▶ GET  /authorize           store transaction ──▶ 302 /consent
//! user   ──▶ POST /consent/approve     CSRF check ──▶ 302 upstream auth
//! upstream ▶ GET  /auth/callback       mint proxy code ──▶ 302 client
//! client ──▶ POST /token               secret + PKCE check, consume code,
//!                                      upstream exchange, tokens verbatim
//! ```
//!
//! ## Architecture
//!
//! | Layer | Module | Responsibility |
//! |-------|--------|----------------|
//! | HTTP | [`api`] | routes, handlers, DTOs |
//! | Middleware | [`middleware`] | body-size guard, bearer probe, rate limits |
//! | Service | [`service`] | the OAuth proxy state machine, PKCE, upstream |
//! | Domain | [`domain`] | persisted record types |
//! | Infrastructure | `shared` crate | config, errors, stores, limiters |
//!
//! ## Configuration
//!
//! Environment variables are loaded via [`shared::config::AppConfig`];
//! the deployment-facing names are `PORT`, `MCP_SERVER_PUBLIC_URL`,
//! `OIDC_PROVIDER_BASE_URL` / `_CLIENT_ID` / `_CLIENT_SECRET`,
//! `SESSION_SECRET_KEY`, `STORAGE_BACKEND`, `REDIS_*`, `CATALYST_*`,
//! `BEHIND_PROXY`, `TRUSTED_PROXY_LIST`, `ANALYTICS_SERVER_URL`.

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use ipnet::IpNet;
use sha2::{Digest, Sha512};
use shared::config::{AppConfig, StorageBackend};
use shared::persistence::{spawn_ttl_reaper, StoreFactory, REAPER_PERIOD};
use shared::rate_limit::{
    spawn_cleanup_task, LimiterBackend, RateLimiterRegistry, CLEANUP_PERIOD,
};
use shared::{redis_client, tracing_config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod analytics;
mod api;
mod domain;
mod middleware;
mod pages;
mod service;

#[cfg(test)]
pub mod test_support;

use analytics::AnalyticsApiClient;
use domain::entities::{AuthorizationCode, AuthorizationTransaction, RegisteredClient};
use middleware::bearer::TokenValidator;
use service::upstream::UpstreamOAuthClient;
use service::OAuthProxyService;

/// Shared application state injected into handlers and middleware.
///
/// Cheap to clone: everything inside is reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup
    pub config: Arc<AppConfig>,
    /// The OAuth proxy state machine
    pub oauth: OAuthProxyService,
    /// Process-wide limiter registry (global + per-route buckets)
    pub limiters: Arc<RateLimiterRegistry>,
    /// Bearer probe against the analytics collaborator
    pub token_validator: Arc<dyn TokenValidator>,
    /// Parsed `TRUSTED_PROXY_LIST`, computed once
    pub trusted_proxies: Arc<Vec<IpNet>>,
    /// Signing key for the consent session cookie
    cookie_key: Key,
}

/// Lets `SignedCookieJar` find its signing key in the router state.
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

/// Derives the cookie-signing key from `SESSION_SECRET_KEY`.
///
/// The key type wants 64 bytes; hashing lets operators use a secret of
/// any length.
pub(crate) fn derive_cookie_key(session_secret: &str) -> Key {
    let digest = Sha512::digest(session_secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Application entry point.
///
/// # Initialization Sequence
///
/// 1. Load configuration and initialize tracing
/// 2. Connect the shared Redis manager (redis backend only)
/// 3. Build the three OAuth stores via the store factory
/// 4. Build the limiter registry and the global limiter
/// 5. Assemble the application state and router
/// 6. Start the TTL reaper and limiter-cleanup background tasks
/// 7. Serve until SIGINT/SIGTERM, then cancel-and-await the tasks
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().expect("Failed to load configuration");
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = config.server.port,
        backend = ?config.storage.backend,
        "Starting oauth-proxy"
    );

    let config = Arc::new(config);

    // One shared Redis connection manager, created once and cloned into
    // the stores and the limiter.
    let redis = match config.storage.backend {
        StorageBackend::Redis => Some(
            redis_client::connect(&config.storage.redis)
                .await
                .expect("Failed to connect to Redis"),
        ),
        _ => None,
    };

    let store_factory = StoreFactory::new(&config.storage, redis.clone(), &config.oidc_base());
    let clients = store_factory
        .build::<RegisteredClient>("registered_clients")
        .expect("Failed to build client store");
    let transactions = store_factory
        .build::<AuthorizationTransaction>("auth_transactions")
        .expect("Failed to build transaction store");
    let codes = store_factory
        .build::<AuthorizationCode>("auth_codes")
        .expect("Failed to build code store");

    let limiter_backend = match &redis {
        Some(conn) => LimiterBackend::Redis(conn.clone()),
        None => LimiterBackend::Memory,
    };
    let limiters = Arc::new(RateLimiterRegistry::new(limiter_backend));
    // Build the global limiter up front so the cleanup task sees it from
    // the first sweep.
    limiters
        .get_or_build(
            config.limits.rate_limit_capacity,
            config.limits.rate_limit_window_seconds,
        )
        .await;

    let upstream = Arc::new(UpstreamOAuthClient::new(&config));
    let oauth = OAuthProxyService::new(config.clone(), clients, transactions, codes, upstream);
    let token_validator: Arc<dyn TokenValidator> =
        Arc::new(AnalyticsApiClient::new(&config.analytics.server_url));

    let state = AppState {
        config: config.clone(),
        oauth,
        limiters: limiters.clone(),
        token_validator,
        trusted_proxies: Arc::new(config.proxy.trusted_networks()),
        cookie_key: derive_cookie_key(&config.session_secret_key),
    };

    // Background tasks: TTL reaper (in-memory stores) and idle-bucket
    // cleanup. Both run until cancelled at shutdown.
    let reaper = spawn_ttl_reaper(store_factory.sweepers(), REAPER_PERIOD);
    let limiter_cleanup = spawn_cleanup_task(limiters.clone(), CLEANUP_PERIOD);

    let app = api::routes::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cancellation is awaited so the tasks are fully gone before exit.
    reaper.abort();
    limiter_cleanup.abort();
    let _ = reaper.await;
    let _ = limiter_cleanup.await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
