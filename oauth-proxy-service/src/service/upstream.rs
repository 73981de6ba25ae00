//! # Upstream Token Exchange
//!
//! The back-channel POST to the upstream provider's token endpoint. This
//! is where the static upstream credentials are injected — the only
//! component that ever sees them besides configuration loading.
//!
//! Failures of any kind (transport, timeout, non-2xx, unparseable body)
//! flatten to [`ApiError::UpstreamExchangeFailed`]; the caller answers 502
//! and the upstream's actual status never leaks to the downstream client.

use shared::config::AppConfig;
use shared::errors::{ApiError, ApiResult};
use std::time::Duration;
use tracing::{error, info};

/// Conservative ceiling on one upstream round trip; exceeding it maps
/// to 502.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// Grant payloads the proxy forwards upstream.
#[derive(Debug, Clone)]
pub enum UpstreamGrant {
    /// Redeem the upstream authorization code captured at the callback.
    /// `redirect_uri` is attached for this grant only.
    AuthorizationCode { code: String },
    /// Pass a downstream-held refresh token through.
    RefreshToken { refresh_token: String },
}

impl UpstreamGrant {
    fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Client for the upstream provider's `/oauth/v2/token` endpoint.
pub struct UpstreamOAuthClient {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    /// The proxy's own callback, registered with the upstream provider
    callback_url: String,
}

impl UpstreamOAuthClient {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .expect("failed to build upstream HTTP client");

        Self {
            http,
            token_endpoint: format!("{}/oauth/v2/token", config.oidc_base()),
            client_id: config.oidc.client_id.clone(),
            client_secret: config.oidc.client_secret.clone(),
            callback_url: format!("{}/auth/callback", config.public_base()),
        }
    }

    /// Performs the token exchange and returns the upstream token document
    /// verbatim (`access_token`, `token_type`, `expires_in`,
    /// `refresh_token`, `scope`, `id_token`, ...).
    pub async fn exchange(&self, grant: UpstreamGrant) -> ApiResult<serde_json::Value> {
        let grant_type = grant.grant_type();
        let mut form: Vec<(&str, &str)> = vec![("grant_type", grant_type)];

        match &grant {
            UpstreamGrant::AuthorizationCode { code } => {
                form.push(("code", code));
                // redirect_uri is only needed for the initial
                // authorization_code exchange
                form.push(("redirect_uri", &self.callback_url));
            }
            UpstreamGrant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token));
            }
        }

        form.push(("client_id", &self.client_id));
        form.push(("client_secret", &self.client_secret));

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(grant_type, error = %e, "Upstream token endpoint unreachable");
                ApiError::UpstreamExchangeFailed
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(grant_type, %status, body = %body, "Upstream token exchange rejected");
            return Err(ApiError::UpstreamExchangeFailed);
        }

        let tokens = response.json::<serde_json::Value>().await.map_err(|e| {
            error!(grant_type, error = %e, "Upstream token response was not valid JSON");
            ApiError::UpstreamExchangeFailed
        })?;

        info!(grant_type, "Upstream token exchange succeeded");
        Ok(tokens)
    }
}

impl std::fmt::Debug for UpstreamOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the static upstream credentials, not even in Debug.
        f.debug_struct("UpstreamOAuthClient")
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
