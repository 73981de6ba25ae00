//! # Analytics Collaborator (bearer probe)
//!
//! The proxy consumes exactly one capability from the analytics platform:
//! "prove this bearer token is alive by performing one cheap authenticated
//! read". Listing the caller's owned workspaces is that read — the result
//! is discarded; only success matters.
//!
//! Everything else the analytics API offers (views, queries, exports) is
//! out of scope here and lives with the MCP tool surface.

use crate::middleware::bearer::TokenValidator;
use async_trait::async_trait;
use shared::errors::{ApiError, ApiResult};
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal analytics REST client.
pub struct AnalyticsApiClient {
    http: reqwest::Client,
    server_url: String,
}

impl AnalyticsApiClient {
    pub fn new(server_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("failed to build analytics HTTP client");

        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    /// Lists the workspaces owned by the token's user.
    ///
    /// Used purely as an authenticated liveness probe for the token.
    pub async fn get_owned_workspaces(&self, access_token: &str) -> ApiResult<()> {
        let response = self
            .http
            .get(format!("{}/restapi/v2/workspaces/owned", self.server_url))
            .header("Authorization", format!("Zoho-oauthtoken {}", access_token))
            .send()
            .await
            .map_err(|e| ApiError::InvalidToken { detail: e.to_string() })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::InvalidToken {
                detail: format!("analytics probe answered {}", response.status()),
            })
        }
    }
}

#[async_trait]
impl TokenValidator for AnalyticsApiClient {
    async fn validate_token(&self, token: &str) -> ApiResult<()> {
        // The detail of *why* the probe failed stays in logs; callers
        // uniformly answer 401 invalid_token so upstream statuses never
        // leak through.
        self.get_owned_workspaces(token).await.map_err(|e| {
            debug!(error = %e, "Bearer probe failed");
            ApiError::InvalidToken { detail: "Invalid or expired token".into() }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_sends_zoho_oauthtoken_scheme() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/restapi/v2/workspaces/owned"))
            .and(header("Authorization", "Zoho-oauthtoken tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "ownedWorkspaces": [] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnalyticsApiClient::new(&server.uri());
        assert!(client.validate_token("tok-123").await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_failure_flattens_to_invalid_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = AnalyticsApiClient::new(&server.uri());
        let err = client.validate_token("tok-123").await.unwrap_err();

        match err {
            ApiError::InvalidToken { detail } => {
                // The analytics status code must not leak to the caller.
                assert_eq!(detail, "Invalid or expired token");
            }
            other => panic!("expected InvalidToken, got {other:?}"),
        }
    }
}
