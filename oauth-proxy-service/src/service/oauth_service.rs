//! # OAuth Proxy Core
//!
//! The state machine that bridges DCR-only MCP clients and the
//! static-registration upstream provider:
//!
//! ```text
//! downstream client      proxy                              upstream
//!       │  POST /register  │                                    │
//!       │─────────────────▶│ mint client_id/secret, store 24h   │
//!       │  GET /authorize   │                                    │
//!       │─────────────────▶│ store transaction (120 s)          │
//!       │◀─ 302 /consent ──│                                    │
//!       │  approve consent  │                                    │
//!       │─────────────────▶│── 302 /oauth/v2/auth (state=txn) ─▶│
//!       │                   │◀── GET /auth/callback?code=UCODE ──│
//!       │◀ 302 cb?code=P ──│ store code→UCODE link (120 s)      │
//!       │  POST /token      │                                    │
//!       │─────────────────▶│ verify secret+PKCE, consume code,  │
//!       │                   │── POST /oauth/v2/token ───────────▶│
//!       │◀── upstream tokens verbatim ────────────────────────── │
//! ```
//!
//! The static upstream credentials only ever travel on the bottom edge;
//! the downstream client sees proxy-minted identifiers exclusively.

use crate::api::dto::{ClientRegistrationResponse, DynamicClientRegistrationRequest, TokenRequest};
use crate::domain::entities::{
    default_grant_types, default_response_types, AuthorizationCode, AuthorizationTransaction,
    RegisteredClient,
};
use crate::service::pkce::verify_pkce;
use crate::service::secrets::{constant_time_eq, urlsafe_token};
use crate::service::upstream::{UpstreamGrant, UpstreamOAuthClient};
use chrono::Utc;
use shared::config::AppConfig;
use shared::errors::{ApiError, ApiResult};
use shared::persistence::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Scope granted when neither the authorize request nor the registration
/// carries one.
pub const DEFAULT_SCOPE: &str = "ZohoAnalytics.fullaccess.all";

/// Lifetime of a registered client record.
pub const CLIENT_REGISTRATION_TTL_SECONDS: u64 = 86_400;

/// Lifetime of an in-flight authorize transaction.
pub const AUTH_TRANSACTION_TTL_SECONDS: u64 = 120;

/// Lifetime of an unredeemed proxy authorization code.
pub const AUTH_CODE_TTL_SECONDS: u64 = 120;

/// Appends query parameters to a URI, merging with any existing query
/// string. `None` values are skipped.
fn merge_query(base: &str, params: &[(&str, Option<&str>)]) -> ApiResult<String> {
    let mut url = reqwest::Url::parse(base).map_err(|_| ApiError::InvalidRequest {
        detail: "redirect target is not a valid URL".into(),
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
    }

    Ok(url.to_string())
}

/// Business logic for the OAuth proxy endpoints.
///
/// Cheap to clone: every field is shared.
#[derive(Clone)]
pub struct OAuthProxyService {
    config: Arc<AppConfig>,
    pub(crate) clients: Arc<dyn KeyValueStore<RegisteredClient>>,
    pub(crate) transactions: Arc<dyn KeyValueStore<AuthorizationTransaction>>,
    pub(crate) codes: Arc<dyn KeyValueStore<AuthorizationCode>>,
    upstream: Arc<UpstreamOAuthClient>,
}

impl OAuthProxyService {
    pub fn new(
        config: Arc<AppConfig>,
        clients: Arc<dyn KeyValueStore<RegisteredClient>>,
        transactions: Arc<dyn KeyValueStore<AuthorizationTransaction>>,
        codes: Arc<dyn KeyValueStore<AuthorizationCode>>,
        upstream: Arc<UpstreamOAuthClient>,
    ) -> Self {
        Self {
            config,
            clients,
            transactions,
            codes,
            upstream,
        }
    }

    /// Recovery page shown to clients whose cached registration expired.
    pub fn help_url(&self) -> String {
        format!("{}/static/invalid_token.html", self.config.public_base())
    }

    // =========================================================================
    // Dynamic Client Registration
    // =========================================================================

    /// Handles a DCR request by minting credentials locally.
    ///
    /// The upstream provider would reject a registration attempt, so the
    /// proxy acts as the identity broker: it generates a client_id/secret
    /// pair, stores the metadata for 24 hours, and answers as if it were a
    /// DCR-capable authorization server.
    pub async fn register_client(
        &self,
        payload: DynamicClientRegistrationRequest,
    ) -> ApiResult<ClientRegistrationResponse> {
        info!(client_name = ?payload.client_name, "Received client registration request");

        let client_id = Uuid::new_v4().to_string();
        let client_secret = urlsafe_token(32);

        let record = RegisteredClient {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_uris: payload.redirect_uris.unwrap_or_default(),
            client_name: payload.client_name,
            scope: payload.scope,
            grant_types: payload.grant_types.unwrap_or_else(default_grant_types),
            response_types: payload.response_types.unwrap_or_else(default_response_types),
        };

        self.clients
            .set(
                &client_id,
                &record,
                Some(Duration::from_secs(CLIENT_REGISTRATION_TTL_SECONDS)),
            )
            .await?;

        info!(%client_id, "Client registered successfully");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            client_id_issued_at: Utc::now().timestamp(),
            token_endpoint_auth_method: "client_secret_post".to_string(),
            redirect_uris: record.redirect_uris,
            grant_types: record.grant_types,
            response_types: record.response_types,
            scope: DEFAULT_SCOPE.to_string(),
            registration_client_uri: format!(
                "{}/register/{}",
                self.config.public_base(),
                record.client_id
            ),
            registration_access_token: urlsafe_token(32),
        })
    }

    /// Looks up a registered client by id.
    pub async fn find_client(&self, client_id: &str) -> ApiResult<Option<RegisteredClient>> {
        self.clients.get(client_id).await
    }

    // =========================================================================
    // Authorization Transaction
    // =========================================================================

    /// Starts an authorization transaction for a validated client and
    /// returns the consent-page URL to redirect the user agent to.
    ///
    /// The transaction write completes before the URL (and therefore the
    /// 302) is handed back, so the consent page can always find it.
    pub async fn begin_authorization(
        &self,
        client: &RegisteredClient,
        redirect_uri: &str,
        scope: &str,
        state: Option<String>,
        code_challenge: Option<String>,
        code_challenge_method: Option<String>,
    ) -> ApiResult<String> {
        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            warn!(client_id = %client.client_id, "Authorization request with unregistered redirect_uri");
            return Err(ApiError::InvalidRedirectUri);
        }

        info!(client_id = %client.client_id, "Creating authorization transaction");

        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let scope = if !scope.is_empty() {
            scope.to_string()
        } else {
            client
                .scope
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string())
        };

        let transaction = AuthorizationTransaction {
            transaction_id: transaction_id.clone(),
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.to_string(),
            scope,
            state,
            code_challenge,
            code_challenge_method,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(AUTH_TRANSACTION_TTL_SECONDS as i64),
        };

        self.transactions
            .set(
                &transaction_id,
                &transaction,
                Some(Duration::from_secs(AUTH_TRANSACTION_TTL_SECONDS)),
            )
            .await?;

        merge_query(
            &format!("{}/consent", self.config.public_base()),
            &[("transaction_id", Some(transaction_id.as_str()))],
        )
    }

    /// Loads a transaction, rejecting missing ones as
    /// `invalid_transaction` and deleting-then-rejecting expired ones as
    /// `transaction_expired`.
    pub async fn load_valid_transaction(
        &self,
        transaction_id: &str,
    ) -> ApiResult<AuthorizationTransaction> {
        let Some(transaction) = self.transactions.get(transaction_id).await? else {
            warn!(%transaction_id, "Invalid or missing transaction");
            return Err(ApiError::InvalidTransaction);
        };

        if transaction.is_expired(Utc::now()) {
            warn!(%transaction_id, "Expired transaction");
            self.transactions.delete(transaction_id).await?;
            return Err(ApiError::TransactionExpired);
        }

        Ok(transaction)
    }

    /// Builds the upstream authorize URL the approving user is sent to.
    ///
    /// The transaction id rides along as the upstream `state`. PKCE
    /// parameters are deliberately absent: the challenge binds the
    /// downstream client to this proxy, not to the upstream provider.
    pub fn upstream_consent_url(&self, transaction: &AuthorizationTransaction) -> ApiResult<String> {
        let callback = format!("{}/auth/callback", self.config.public_base());

        merge_query(
            &format!("{}/oauth/v2/auth", self.config.oidc_base()),
            &[
                ("client_id", Some(self.config.oidc.client_id.as_str())),
                ("response_type", Some("code")),
                ("redirect_uri", Some(callback.as_str())),
                ("scope", Some(transaction.scope.as_str())),
                ("state", Some(transaction.transaction_id.as_str())),
                ("access_type", Some("offline")),
                ("prompt", Some("Consent")),
            ],
        )
    }

    /// Records a consent denial: consumes the transaction and sends the
    /// user agent back to the client with `error=access_denied`.
    pub async fn deny_authorization(&self, transaction_id: &str) -> ApiResult<String> {
        let transaction = self.load_valid_transaction(transaction_id).await?;
        self.transactions.delete(transaction_id).await?;

        info!(client_id = %transaction.client_id, "User denied consent");

        merge_query(
            &transaction.redirect_uri,
            &[
                ("error", Some("access_denied")),
                ("state", transaction.state.as_deref()),
            ],
        )
    }

    // =========================================================================
    // Callback Brokerage
    // =========================================================================

    /// Exchanges an upstream authorization code for a freshly minted proxy
    /// code and returns the downstream redirect URL.
    ///
    /// Ordering matters: the code record is durable before the redirect
    /// is returned, and the transaction is consumed once the code exists.
    pub async fn complete_callback(
        &self,
        upstream_code: &str,
        transaction_id: &str,
        upstream_location: Option<String>,
    ) -> ApiResult<String> {
        info!(%transaction_id, "Received callback from upstream provider");

        let transaction = self.load_valid_transaction(transaction_id).await?;

        let proxy_code = urlsafe_token(32);
        let now = Utc::now();

        let record = AuthorizationCode {
            transaction_id: transaction_id.to_string(),
            client_id: transaction.client_id.clone(),
            redirect_uri: transaction.redirect_uri.clone(),
            code_challenge: transaction.code_challenge.clone(),
            code_challenge_method: transaction.code_challenge_method.clone(),
            upstream_code: upstream_code.to_string(),
            upstream_location,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(AUTH_CODE_TTL_SECONDS as i64),
        };

        self.codes
            .set(
                &proxy_code,
                &record,
                Some(Duration::from_secs(AUTH_CODE_TTL_SECONDS)),
            )
            .await?;
        self.transactions.delete(transaction_id).await?;

        info!(client_id = %transaction.client_id, "Issued proxy authorization code");

        merge_query(
            &transaction.redirect_uri,
            &[
                ("code", Some(proxy_code.as_str())),
                ("state", transaction.state.as_deref()),
            ],
        )
    }

    // =========================================================================
    // Token Exchange
    // =========================================================================

    /// Validates the client and grant, consumes the proxy code, and
    /// performs the upstream exchange.
    pub async fn exchange_token(&self, request: TokenRequest) -> ApiResult<serde_json::Value> {
        info!(client_id = %request.client_id, grant_type = %request.grant_type, "Token exchange requested");

        let client = self.clients.get(&request.client_id).await?;
        let authentic = client
            .as_ref()
            .map(|c| constant_time_eq(&c.client_secret, &request.client_secret))
            .unwrap_or(false);
        if !authentic {
            warn!(client_id = %request.client_id, "Invalid client credentials");
            return Err(ApiError::InvalidClient { help_url: self.help_url() });
        }

        let grant = match request.grant_type.as_str() {
            "authorization_code" => {
                let code = request
                    .code
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| ApiError::InvalidRequest {
                        detail: "code is required for the authorization_code grant".into(),
                    })?;

                let Some(record) = self.codes.get(code).await? else {
                    warn!(client_id = %request.client_id, "Unknown authorization code");
                    return Err(ApiError::InvalidGrant);
                };

                if record.client_id != request.client_id {
                    warn!(client_id = %request.client_id, "Authorization code bound to another client");
                    return Err(ApiError::InvalidGrant);
                }

                if record.is_expired(Utc::now()) {
                    self.codes.delete(code).await?;
                    return Err(ApiError::InvalidGrant);
                }

                verify_pkce(
                    request.code_verifier.as_deref(),
                    record.code_challenge.as_deref(),
                    record.code_challenge_method.as_deref(),
                )?;

                // Single-use guarantee: the proxy code is gone before the
                // upstream exchange starts, so a concurrent replay finds
                // nothing.
                self.codes.delete(code).await?;

                UpstreamGrant::AuthorizationCode { code: record.upstream_code }
            }

            "refresh_token" => {
                let refresh_token = request
                    .refresh_token
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| ApiError::InvalidRequest {
                        detail: "refresh_token is required for the refresh_token grant".into(),
                    })?;

                UpstreamGrant::RefreshToken { refresh_token: refresh_token.to_string() }
            }

            other => {
                warn!(grant_type = %other, "Unsupported grant type");
                return Err(ApiError::UnsupportedGrantType);
            }
        };

        self.upstream.exchange(grant).await
    }
}

// =============================================================================
// Tests
// =============================================================================
