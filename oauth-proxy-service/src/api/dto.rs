//! # Request / Response DTOs
//!
//! Wire shapes for the OAuth endpoints. Field names follow RFC 7591/6749
//! snake_case — they are the protocol, not a styling choice.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// =============================================================================
// Dynamic Client Registration
// =============================================================================

/// `POST /register` request body (RFC 7591 client metadata subset).
///
/// Every field is optional; defaults are applied at registration time.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DynamicClientRegistrationRequest {
    /// Exact-match redirect allowlist for later `/authorize` calls
    #[validate(custom(function = "validate_redirect_uris"))]
    pub redirect_uris: Option<Vec<String>>,

    /// Human-readable application name
    #[validate(length(max = 200))]
    pub client_name: Option<String>,

    /// Default scope for this client's authorize requests
    pub scope: Option<String>,

    /// Defaults to `["authorization_code", "refresh_token"]`
    pub grant_types: Option<Vec<String>>,

    /// Defaults to `["code"]`
    pub response_types: Option<Vec<String>>,
}

/// Each registered redirect target must at least parse as an absolute URL.
fn validate_redirect_uris(uris: &Vec<String>) -> Result<(), ValidationError> {
    for uri in uris {
        if reqwest::Url::parse(uri).is_err() {
            return Err(ValidationError::new("invalid_redirect_uri"));
        }
    }
    Ok(())
}

/// `POST /register` response body.
///
/// Status is 200 (not 201) by contract with existing MCP hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    /// Unix timestamp of issuance
    pub client_id_issued_at: i64,
    pub token_endpoint_auth_method: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub registration_client_uri: String,
    pub registration_access_token: String,
}

// =============================================================================
// Authorization Flow
// =============================================================================

/// `GET /authorize` query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: String,
    pub redirect_uri: String,
    /// Empty means "use the client's registered scope, else the default"
    #[serde(default)]
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// `GET /consent` query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentQuery {
    pub transaction_id: String,
}

/// `POST /consent/approve` and `POST /consent/deny` form body.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentForm {
    pub transaction_id: String,
    pub csrf_token: String,
}

/// `GET /auth/callback` query parameters from the upstream provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// The upstream authorization code
    pub code: String,
    /// Echoed transaction id
    pub state: String,
    /// Optional region hint; stored, never interpreted
    pub location: Option<String>,
}

// =============================================================================
// Token Exchange
// =============================================================================

/// `POST /token` form body (`client_secret_post` authentication).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    /// Proxy-issued code (authorization_code grant)
    pub code: Option<String>,
    /// Upstream refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// PKCE verifier matching the challenge from `/authorize`
    pub code_verifier: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_request_accepts_valid_redirects() {
        let request = DynamicClientRegistrationRequest {
            redirect_uris: Some(vec![
                "https://c/cb".into(),
                "http://localhost:3000/callback".into(),
            ]),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_registration_request_rejects_garbage_redirects() {
        let request = DynamicClientRegistrationRequest {
            redirect_uris: Some(vec!["not a url at all".into()]),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_registration_request_allows_everything_absent() {
        let request: DynamicClientRegistrationRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_ok());
        assert!(request.redirect_uris.is_none());
    }

    #[test]
    fn test_token_request_parses_urlencoded_form() {
        let form = "grant_type=authorization_code&client_id=c1&client_secret=s1&code=P&code_verifier=v";
        let parsed: TokenRequest = serde_urlencoded::from_str(form).unwrap();

        assert_eq!(parsed.grant_type, "authorization_code");
        assert_eq!(parsed.code.as_deref(), Some("P"));
        assert_eq!(parsed.refresh_token, None);
    }
}
