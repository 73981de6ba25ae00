//! # Application Configuration
//!
//! Centralized configuration management using environment variables.
//!
//! ## How It Works
//!
//! Configuration is loaded from multiple sources in order of precedence:
//!
//! 1. **Default values** - Sensible defaults for development
//! 2. **`.env` file** - Local overrides (git-ignored)
//! 3. **`APP_*` environment variables** - Nested sections with `__` separator
//! 4. **Flat overrides** - The deployment-facing names used by Docker and
//!    the hosting platform (`PORT`, `OIDC_PROVIDER_BASE_URL`, ...)
//!
//! ## Environment Variable Format
//!
//! ```bash
//! # Nested form
//! APP_SERVER__HOST=0.0.0.0
//! APP_LIMITS__MAX_BODY_SIZE=1000000
//!
//! # Flat deployment names (take precedence)
//! PORT=4000
//! MCP_SERVER_PUBLIC_URL=https://proxy.example.com
//! OIDC_PROVIDER_BASE_URL=https://accounts.zoho.com
//! OIDC_PROVIDER_CLIENT_ID=...
//! OIDC_PROVIDER_CLIENT_SECRET=...
//! SESSION_SECRET_KEY=...
//! STORAGE_BACKEND=redis          # memory | redis | catalyst
//! REDIS_HOST=redis REDIS_PORT=6379 REDIS_PASSWORD=...
//! BEHIND_PROXY=true
//! TRUSTED_PROXY_LIST=10.0.0.0/8,172.16.0.0/12
//! ```
//!
//! ## Security Notes
//!
//! - Never commit `.env` files with real secrets
//! - The upstream client credentials configured here must never appear in
//!   responses, redirects, or log lines

use config::{Config, ConfigError, Environment};
use ipnet::IpNet;
use serde::Deserialize;

/// Main application configuration.
///
/// Immutable after creation - create once at startup and share via `Arc`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings (bind host, port)
    pub server: ServerConfig,

    /// Public base URL of this proxy, as seen by MCP clients and the
    /// upstream provider (`MCP_SERVER_PUBLIC_URL`)
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Secret used to sign the consent session cookie (`SESSION_SECRET_KEY`)
    #[serde(default = "default_session_secret")]
    pub session_secret_key: String,

    /// Service name for tracing and logging
    pub service_name: String,

    /// Runtime environment (development/staging/production)
    #[serde(default)]
    pub environment: AppEnvironment,

    /// Upstream identity provider (static client credentials)
    pub oidc: OidcProviderConfig,

    /// Analytics REST API used for the bearer-token probe
    pub analytics: AnalyticsConfig,

    /// Persistence backend selection and credentials
    pub storage: StorageConfig,

    /// Reverse-proxy trust settings for client-IP extraction
    pub proxy: ProxyTrustConfig,

    /// Request-ingress limits (body size, global rate limit)
    pub limits: LimitConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to. Default: `0.0.0.0`
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number to listen on. Default: `4000`
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream identity provider configuration.
///
/// The provider supports Static Client Registration only; this single
/// pre-registered client fronts every dynamically registered downstream
/// client. These credentials never leave the process (I5).
#[derive(Debug, Clone, Deserialize)]
pub struct OidcProviderConfig {
    /// Accounts server base URL (`OIDC_PROVIDER_BASE_URL`)
    #[serde(default = "default_oidc_base_url")]
    pub base_url: String,

    /// Statically registered upstream client id
    #[serde(default)]
    pub client_id: String,

    /// Statically registered upstream client secret
    #[serde(default)]
    pub client_secret: String,
}

/// Analytics collaborator configuration.
///
/// Only one capability is consumed from it: "validate this bearer token
/// by performing one authenticated read".
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Analytics API server base URL (`ANALYTICS_SERVER_URL`)
    #[serde(default = "default_analytics_url")]
    pub server_url: String,
}

/// Which persistence backend the three OAuth stores use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map with a TTL reaper; state is lost on restart
    #[default]
    Memory,
    /// Redis with native expire-on-write TTLs
    Redis,
    /// Zoho Catalyst Cloud Scale cache over REST
    Catalyst,
}

/// Persistence backend selection plus per-backend credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `STORAGE_BACKEND ∈ {memory, redis, catalyst}`
    #[serde(default)]
    pub backend: StorageBackend,

    /// Redis connection settings (used when backend = redis)
    pub redis: RedisConfig,

    /// Catalyst cache settings (used when backend = catalyst)
    pub catalyst: CatalystConfig,
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis host. Default: `localhost`
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Redis port. Default: `6379`
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Optional password
    #[serde(default)]
    pub password: Option<String>,
}

impl RedisConfig {
    /// Builds the `redis://` connection URL from the individual settings.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}", password, self.host, self.port)
            }
            _ => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

/// Catalyst Cloud Scale cache settings (remote persistence backend).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalystConfig {
    /// Catalyst project id (`CATALYST_PROJECT_ID`)
    #[serde(default)]
    pub project_id: String,

    /// Cache segment id (`CATALYST_CACHE_SEGMENT_ID`)
    #[serde(default)]
    pub cache_segment_id: String,

    /// API domain. Default: `https://api.catalyst.zoho.in`
    #[serde(default = "default_catalyst_domain")]
    pub project_domain: String,

    /// OAuth client id used to refresh the cache access token
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret used to refresh the cache access token
    #[serde(default)]
    pub client_secret: String,

    /// Long-lived refresh token for the cache API
    #[serde(default)]
    pub refresh_token: String,
}

/// Reverse-proxy trust settings.
///
/// Forwarded headers are only believed when the socket peer is inside one
/// of the trusted CIDRs; see the client-IP extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyTrustConfig {
    /// Whether the service sits behind a reverse proxy (`BEHIND_PROXY`)
    #[serde(default)]
    pub behind_proxy: bool,

    /// Comma-separated CIDR list (`TRUSTED_PROXY_LIST`)
    #[serde(default)]
    pub trusted_proxy_list: String,
}

impl ProxyTrustConfig {
    /// Parses `TRUSTED_PROXY_LIST` into networks, skipping entries that
    /// fail to parse.
    pub fn trusted_networks(&self) -> Vec<IpNet> {
        self.trusted_proxy_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<IpNet>().ok())
            .collect()
    }
}

/// Request-ingress limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    /// Maximum accepted request body size in bytes. Default: 1 MB
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Global rate-limit burst capacity. Default: 50
    #[serde(default = "default_rate_capacity")]
    pub rate_limit_capacity: u32,

    /// Seconds for the global bucket to refill from empty. Default: 60
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_seconds: u64,
}

/// Application runtime environment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local development - verbose logging
    #[default]
    Development,
    /// Pre-production testing
    Staging,
    /// Production - JSON logging
    Production,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Process
    ///
    /// 1. Loads `.env` file if present (silently ignores if missing)
    /// 2. Applies default values
    /// 3. Overrides with `APP_*` environment variables
    /// 4. Applies the flat deployment names (`PORT`, `OIDC_PROVIDER_*`, ...)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed to expected types.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (development convenience)
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Set sensible defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("service_name", "oauth-proxy")?
            .set_default("environment", "development")?
            .set_default("oidc.base_url", default_oidc_base_url())?
            .set_default("analytics.server_url", default_analytics_url())?
            .set_default("storage.backend", "memory")?
            .set_default("storage.redis.host", "localhost")?
            .set_default("storage.redis.port", 6379)?
            .set_default("storage.catalyst.project_domain", default_catalyst_domain())?
            .set_default("proxy.behind_proxy", false)?
            .set_default("limits.max_body_size", 1_000_000)?
            .set_default("limits.rate_limit_capacity", 50)?
            .set_default("limits.rate_limit_window_seconds", 60)?
            // Load from APP_* environment variables
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat deployment-facing overrides
            .set_override_option("public_url", env_string("MCP_SERVER_PUBLIC_URL"))?
            .set_override_option("session_secret_key", env_string("SESSION_SECRET_KEY"))?
            .set_override_option("service_name", env_string("SERVICE_NAME"))?
            .set_override_option("server.port", env_u16("PORT"))?
            .set_override_option("oidc.base_url", env_string("OIDC_PROVIDER_BASE_URL"))?
            .set_override_option("oidc.client_id", env_string("OIDC_PROVIDER_CLIENT_ID"))?
            .set_override_option("oidc.client_secret", env_string("OIDC_PROVIDER_CLIENT_SECRET"))?
            .set_override_option("analytics.server_url", env_string("ANALYTICS_SERVER_URL"))?
            .set_override_option("storage.backend", env_string("STORAGE_BACKEND").map(|s| s.to_lowercase()))?
            .set_override_option("storage.redis.host", env_string("REDIS_HOST"))?
            .set_override_option("storage.redis.port", env_u16("REDIS_PORT"))?
            .set_override_option("storage.redis.password", env_string("REDIS_PASSWORD"))?
            .set_override_option("storage.catalyst.project_id", env_string("CATALYST_PROJECT_ID"))?
            .set_override_option("storage.catalyst.cache_segment_id", env_string("CATALYST_CACHE_SEGMENT_ID"))?
            .set_override_option("storage.catalyst.project_domain", env_string("CATALYST_PROJECT_DOMAIN"))?
            .set_override_option("storage.catalyst.client_id", env_string("CATALYST_CLIENT_ID"))?
            .set_override_option("storage.catalyst.client_secret", env_string("CATALYST_CLIENT_SECRET"))?
            .set_override_option("storage.catalyst.refresh_token", env_string("CATALYST_REFRESH_TOKEN"))?
            .set_override_option("proxy.behind_proxy", env_bool("BEHIND_PROXY"))?
            .set_override_option("proxy.trusted_proxy_list", env_string("TRUSTED_PROXY_LIST"))?
            .build()?;

        config.try_deserialize()
    }

    /// Public base URL without a trailing slash, for joining endpoint paths.
    pub fn public_base(&self) -> String {
        self.public_url.trim_end_matches('/').to_string()
    }

    /// Upstream provider base URL without a trailing slash.
    pub fn oidc_base(&self) -> String {
        self.oidc.base_url.trim_end_matches('/').to_string()
    }

    /// Returns `true` if running in development mode.
    #[inline]
    pub fn is_development(&self) -> bool {
        self.environment == AppEnvironment::Development
    }

    /// Returns `true` if running in production mode.
    #[inline]
    pub fn is_production(&self) -> bool {
        self.environment == AppEnvironment::Production
    }
}

// =============================================================================
// Env Helpers
// =============================================================================
// The flat deployment names are plain strings; numeric and boolean values
// are parsed here so malformed input falls back to defaults instead of
// failing deserialization with an opaque type error.

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u16(name: &str) -> Option<i64> {
    env_string(name)?.parse::<u16>().ok().map(i64::from)
}

fn env_bool(name: &str) -> Option<bool> {
    let value = env_string(name)?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_public_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_session_secret() -> String {
    // Development fallback; deployments must set SESSION_SECRET_KEY
    "supersecretkey".to_string()
}

fn default_oidc_base_url() -> String {
    "https://accounts.zoho.com".to_string()
}

fn default_analytics_url() -> String {
    "https://analyticsapi.zoho.com".to_string()
}

fn default_catalyst_domain() -> String {
    "https://api.catalyst.zoho.in".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_max_body_size() -> usize {
    1_000_000
}

fn default_rate_capacity() -> u32 {
    50
}

fn default_rate_window() -> u64 {
    60
}

// =============================================================================
// Tests
// =============================================================================
