//! Catalyst Cloud Scale cache backend (remote REST persistence).
//!
//! Speaks the cache segment API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | set | `POST <base> {"cache_name", "cache_value", "expiry_in_hours"}` |
//! | get | `GET <base>?cacheKey=<key>` |
//! | delete | `DELETE <base>?cacheKey=<key>` |
//!
//! where `<base>` is
//! `<project_domain>/baas/v1/project/<project_id>/segment/<segment_id>/cache`.
//!
//! The segment expresses TTLs in whole hours: seconds are converted with
//! `max(1, ceil(secs / 3600))`, and a supplied TTL of zero means no expiry.
//!
//! Requests authenticate with a `Zoho-oauthtoken` access token kept behind
//! an async lock. When a response fails with `AUTHENTICATION_FAILURE`, the
//! token is refreshed once via the accounts token endpoint and the request
//! is retried exactly once; any other failure surfaces immediately.

use super::KeyValueStore;
use crate::config::CatalystConfig;
use crate::errors::{ApiError, ApiResult};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Catalyst-cache-backed store for one record type.
pub struct CatalystCacheStore<T> {
    http: reqwest::Client,
    base_url: String,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    prefix: String,
    access_token: RwLock<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CatalystCacheStore<T> {
    pub fn new(
        http: reqwest::Client,
        config: &CatalystConfig,
        accounts_url: &str,
        scope: &str,
    ) -> Self {
        let base_url = format!(
            "{}/baas/v1/project/{}/segment/{}/cache",
            config.project_domain.trim_end_matches('/'),
            config.project_id,
            config.cache_segment_id,
        );

        Self {
            http,
            base_url,
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            prefix: scope.to_string(),
            access_token: RwLock::new(String::new()),
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Converts a TTL to the segment's hour granularity.
    ///
    /// Sub-hour TTLs become one hour; zero means no expiry.
    fn expiry_hours(ttl: Option<Duration>) -> Option<u64> {
        let ttl = ttl.filter(|d| !d.is_zero())?;
        Some(ttl.as_secs().div_ceil(3600).max(1))
    }

    async fn send(
        &self,
        method: Method,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<(reqwest::StatusCode, String)> {
        let token = self.access_token.read().await.clone();
        let mut request = self
            .http
            .request(method, &self.base_url)
            .header("Authorization", format!("Zoho-oauthtoken {}", token));

        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;

        Ok((status, text))
    }

    /// Checks whether a failed response reports an expired access token.
    fn is_auth_failure(body: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("data")?
                    .get("error_code")
                    .map(|code| code == "AUTHENTICATION_FAILURE")
            })
            .unwrap_or(false)
    }

    /// Refreshes the cache access token via the accounts token endpoint.
    async fn refresh_access_token(&self) -> ApiResult<()> {
        debug!("Refreshing Catalyst cache access token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(format!("{}/oauth/v2/token", self.accounts_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;

        match body.get("access_token").and_then(|t| t.as_str()) {
            Some(token) if status.is_success() => {
                *self.access_token.write().await = token.to_string();
                Ok(())
            }
            _ => Err(ApiError::Storage {
                message: format!("Catalyst token refresh failed with status {}", status),
            }),
        }
    }

    /// Executes a cache request, refreshing the access token and retrying
    /// at most once on `AUTHENTICATION_FAILURE`.
    async fn execute_with_retry(
        &self,
        method: Method,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<(reqwest::StatusCode, String)> {
        let (status, text) = self.send(method.clone(), query, body).await?;

        if !status.is_success() && Self::is_auth_failure(&text) {
            warn!("Catalyst access token rejected; refreshing and retrying once");
            self.refresh_access_token().await?;
            return self.send(method, query, body).await;
        }

        Ok((status, text))
    }
}

#[async_trait]
impl<T> KeyValueStore<T> for CatalystCacheStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> ApiResult<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;

        let mut body = json!({
            "cache_name": self.full_key(key),
            "cache_value": payload,
        });
        if let Some(hours) = Self::expiry_hours(ttl) {
            body["expiry_in_hours"] = json!(hours);
        }

        let (status, text) = self
            .execute_with_retry(Method::POST, None, Some(&body))
            .await?;

        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Storage {
                message: format!("Catalyst cache insert failed ({}): {}", status, text),
            })
        }
    }

    async fn get(&self, key: &str) -> ApiResult<Option<T>> {
        let full_key = self.full_key(key);
        let query = [("cacheKey", full_key.as_str())];
        let (status, text) = self
            .execute_with_retry(Method::GET, Some(&query), None)
            .await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Storage {
                message: format!("Catalyst cache read failed ({}): {}", status, text),
            });
        }

        let envelope: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;

        // An expired or never-written key comes back with a null value.
        let raw = envelope
            .get("data")
            .and_then(|d| d.get("cache_value"))
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty());

        match raw {
            Some(payload) => {
                let value = serde_json::from_str(payload)
                    .map_err(|e| ApiError::Storage { message: e.to_string() })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> ApiResult<()> {
        let full_key = self.full_key(key);
        let query = [("cacheKey", full_key.as_str())];
        let (status, text) = self
            .execute_with_retry(Method::DELETE, Some(&query), None)
            .await?;

        // Deleting an absent key is not an error (idempotent contract).
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(ApiError::Storage {
                message: format!("Catalyst cache delete failed ({}): {}", status, text),
            })
        }
    }
}

impl<T> std::fmt::Debug for CatalystCacheStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalystCacheStore")
            .field("prefix", &self.prefix)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
