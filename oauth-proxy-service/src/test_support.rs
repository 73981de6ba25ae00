//! Fixtures shared by the unit and router tests: a fully populated
//! in-memory configuration, a service wired to memory stores, and an
//! application state with a permissive bearer probe.

use crate::middleware::bearer::TokenValidator;
use crate::service::upstream::UpstreamOAuthClient;
use crate::service::OAuthProxyService;
use crate::{derive_cookie_key, AppState};
use shared::config::{
    AnalyticsConfig, AppConfig, AppEnvironment, CatalystConfig, LimitConfig, OidcProviderConfig,
    ProxyTrustConfig, RedisConfig, ServerConfig, StorageBackend, StorageConfig,
};
use shared::errors::ApiResult;
use shared::persistence::InMemoryStore;
use shared::rate_limit::{LimiterBackend, RateLimiterRegistry};
use std::sync::Arc;

/// Baseline configuration for tests; callers mutate what they need.
pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig { host: "127.0.0.1".into(), port: 0 },
        public_url: "https://proxy.test".into(),
        session_secret_key: "unit-test-session-secret".into(),
        service_name: "oauth-proxy-test".into(),
        environment: AppEnvironment::Development,
        oidc: OidcProviderConfig {
            base_url: "https://accounts.zoho.com".into(),
            client_id: "static-client".into(),
            client_secret: "static-secret".into(),
        },
        analytics: AnalyticsConfig { server_url: "https://analyticsapi.zoho.com".into() },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            redis: RedisConfig { host: "localhost".into(), port: 6379, password: None },
            catalyst: CatalystConfig::default(),
        },
        proxy: ProxyTrustConfig { behind_proxy: false, trusted_proxy_list: String::new() },
        limits: LimitConfig {
            max_body_size: 1_000_000,
            rate_limit_capacity: 50,
            rate_limit_window_seconds: 60,
        },
    }
}

/// OAuth service over fresh in-memory stores.
pub fn test_service(config: AppConfig) -> OAuthProxyService {
    let config = Arc::new(config);
    let upstream = Arc::new(UpstreamOAuthClient::new(&config));
    OAuthProxyService::new(
        config,
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        upstream,
    )
}

/// Bearer probe that accepts every token.
struct AcceptAll;

#[async_trait::async_trait]
impl TokenValidator for AcceptAll {
    async fn validate_token(&self, _token: &str) -> ApiResult<()> {
        Ok(())
    }
}

/// Application state with memory everything and a permissive probe.
pub fn test_state(config: AppConfig) -> AppState {
    test_state_with_validator(config, Arc::new(AcceptAll))
}

pub fn test_state_with_validator(
    config: AppConfig,
    token_validator: Arc<dyn TokenValidator>,
) -> AppState {
    let cookie_key = derive_cookie_key(&config.session_secret_key);
    let trusted_proxies = Arc::new(config.proxy.trusted_networks());
    let config = Arc::new(config);
    let upstream = Arc::new(UpstreamOAuthClient::new(&config));

    let oauth = OAuthProxyService::new(
        config.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        upstream,
    );

    AppState {
        config,
        oauth,
        limiters: Arc::new(RateLimiterRegistry::new(LimiterBackend::Memory)),
        token_validator,
        trusted_proxies,
        cookie_key,
    }
}
