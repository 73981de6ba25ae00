//! # PKCE Verification
//!
//! Proof Key for Code Exchange, verified by the proxy between the
//! downstream client and itself — the challenge/verifier pair never goes
//! upstream.
//!
//! | Input problem | Result |
//! |---------------|--------|
//! | no stored challenge, or no verifier | 400 `invalid_request` |
//! | verifier outside `[A-Za-z0-9\-._~]{43,128}` | 400 `invalid_request` |
//! | unknown method | 400 `invalid_request` |
//! | computed value ≠ stored challenge | 400 `invalid_grant` |
//!
//! Methods are case-insensitive: `S256` recomputes
//! `base64url-without-padding(SHA-256(verifier))`, `plain` uses the
//! verifier itself. The final comparison runs in constant time.

use crate::service::secrets::constant_time_eq;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use shared::errors::{ApiError, ApiResult};

/// RFC 7636 §4.1: 43–128 characters of `[A-Za-z0-9\-._~]`.
fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Verifies a `code_verifier` against the challenge stored with the
/// authorization code.
pub fn verify_pkce(
    code_verifier: Option<&str>,
    code_challenge: Option<&str>,
    method: Option<&str>,
) -> ApiResult<()> {
    let challenge = code_challenge.ok_or_else(|| ApiError::InvalidRequest {
        detail: "code_challenge was not provided in the authorization request".into(),
    })?;

    let verifier = code_verifier.ok_or_else(|| ApiError::InvalidRequest {
        detail: "code_verifier is required".into(),
    })?;

    if !is_valid_verifier(verifier) {
        return Err(ApiError::InvalidRequest {
            detail: "code_verifier has an invalid format".into(),
        });
    }

    let computed = match method.unwrap_or("plain").to_uppercase().as_str() {
        "S256" => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        "PLAIN" => verifier.to_string(),
        _ => {
            return Err(ApiError::InvalidRequest {
                detail: "unsupported code_challenge_method".into(),
            })
        }
    };

    if !constant_time_eq(&computed, challenge) {
        return Err(ApiError::InvalidGrant);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
