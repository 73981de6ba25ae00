//! # Domain Entities
//!
//! The three records the proxy persists, each in its own store scope:
//!
//! | Entity | Store scope | Key | TTL |
//! |--------|-------------|-----|-----|
//! | [`RegisteredClient`] | `registered_clients` | `client_id` | ≈ 24 h |
//! | [`AuthorizationTransaction`] | `auth_transactions` | `transaction_id` | ≈ 120 s |
//! | [`AuthorizationCode`] | `auth_codes` | the opaque code itself | ≈ 120 s |
//!
//! Serialized field names are the wire/persistence contract — they must
//! stay stable across releases because Redis and the remote cache may hold
//! records written by an older process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grant types a client gets when its registration request names none.
pub fn default_grant_types() -> Vec<String> {
    vec!["authorization_code".to_string(), "refresh_token".to_string()]
}

/// Response types a client gets when its registration request names none.
pub fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

// =============================================================================
// Registered Client
// =============================================================================

/// A downstream application created via Dynamic Client Registration.
///
/// The upstream provider knows nothing about these clients — the proxy
/// mints the credentials itself and the single static upstream client
/// fronts all of them. Records are never mutated in place; they simply
/// age out after the registration TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredClient {
    /// Freshly minted opaque client identifier (UUID v4)
    pub client_id: String,

    /// High-entropy URL-safe secret; compared in constant time only
    pub client_secret: String,

    /// Exact-match allowlist for the `redirect_uri` authorize parameter
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Display name supplied at registration
    #[serde(default)]
    pub client_name: Option<String>,

    /// Default scope requested at registration
    #[serde(default)]
    pub scope: Option<String>,

    /// Grant types the client may use
    pub grant_types: Vec<String>,

    /// Response types the client may use
    pub response_types: Vec<String>,
}

// =============================================================================
// Authorization Transaction
// =============================================================================

/// An in-flight authorize request, alive between `/authorize` and the
/// return from the upstream provider.
///
/// The `transaction_id` doubles as the upstream `state` parameter, which
/// is what lets `/auth/callback` find the transaction again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationTransaction {
    /// Opaque id; also sent upstream as `state`
    pub transaction_id: String,

    /// The downstream client that started the flow
    pub client_id: String,

    /// Validated against the client's registered list at creation
    pub redirect_uri: String,

    /// Scope forwarded to the upstream provider
    pub scope: String,

    /// The downstream client's own `state`, echoed back on the final
    /// redirect
    #[serde(default)]
    pub state: Option<String>,

    /// PKCE challenge, verified by the proxy at `/token`
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE method (`S256` or `plain`)
    #[serde(default)]
    pub code_challenge_method: Option<String>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationTransaction {
    /// True once `expires_at` has passed.
    ///
    /// Handlers must treat an expired transaction like a replayed one:
    /// delete it and reject.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// =============================================================================
// Authorization Code
// =============================================================================

/// A proxy-issued one-time authorization code.
///
/// Keyed by the opaque code string itself; links the downstream client's
/// pending `/token` call to the upstream code captured at the callback.
/// Consumed (deleted) before the upstream exchange so it can never be
/// redeemed twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The transaction this code was minted from
    pub transaction_id: String,

    /// Must match the `client_id` presented at `/token`
    pub client_id: String,

    /// The downstream redirect the code was issued for
    pub redirect_uri: String,

    /// PKCE challenge carried over from the transaction
    #[serde(default)]
    pub code_challenge: Option<String>,

    #[serde(default)]
    pub code_challenge_method: Option<String>,

    /// The actual upstream authorization code this proxy code stands for
    pub upstream_code: String,

    /// Region hint the upstream may attach to its callback. Stored for
    /// forward compatibility; never interpreted on the return path.
    #[serde(default)]
    pub upstream_location: Option<String>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn transaction(expires_in: i64) -> AuthorizationTransaction {
        let now = Utc::now();
        AuthorizationTransaction {
            transaction_id: "txn-1".into(),
            client_id: "client-1".into(),
            redirect_uri: "https://c/cb".into(),
            scope: "ZohoAnalytics.fullaccess.all".into(),
            state: Some("xyz".into()),
            code_challenge: None,
            code_challenge_method: None,
            created_at: now,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    #[test]
    fn test_transaction_expiry() {
        let now = Utc::now();
        assert!(!transaction(120).is_expired(now));
        assert!(transaction(-1).is_expired(now));
    }

    #[test]
    fn test_registered_client_field_names_are_stable() {
        let client = RegisteredClient {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_uris: vec!["https://c/cb".into()],
            client_name: Some("Test".into()),
            scope: None,
            grant_types: default_grant_types(),
            response_types: default_response_types(),
        };

        let json: serde_json::Value = serde_json::to_value(&client).unwrap();
        // Persistence contract: these exact names live in Redis and the
        // remote cache.
        for field in [
            "client_id",
            "client_secret",
            "redirect_uris",
            "client_name",
            "scope",
            "grant_types",
            "response_types",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn test_authorization_code_roundtrip() {
        let now = Utc::now();
        let code = AuthorizationCode {
            transaction_id: "txn-1".into(),
            client_id: "client-1".into(),
            redirect_uri: "https://c/cb".into(),
            code_challenge: Some("abc".into()),
            code_challenge_method: Some("S256".into()),
            upstream_code: "upstream-xyz".into(),
            upstream_location: Some("us".into()),
            created_at: now,
            expires_at: now + Duration::seconds(120),
        };

        let json = serde_json::to_string(&code).unwrap();
        let parsed: AuthorizationCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn test_default_grant_and_response_types() {
        assert_eq!(default_grant_types(), vec!["authorization_code", "refresh_token"]);
        assert_eq!(default_response_types(), vec!["code"]);
    }
}
