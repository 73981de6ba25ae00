//! Opaque-token generation and constant-time comparison.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Generates a URL-safe random token from `bytes` bytes of entropy.
///
/// 32 bytes (256 bits) yields a 43-character token; used for client
/// secrets, proxy authorization codes, CSRF tokens, and registration
/// access tokens.
pub fn urlsafe_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Constant-time string equality for secret material.
///
/// Inputs of different lengths compare unequal; for equal lengths the
/// comparison examines every byte regardless of where the first
/// difference sits.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_unique_and_urlsafe() {
        let tokens: HashSet<String> = (0..64).map(|_| urlsafe_token(32)).collect();
        assert_eq!(tokens.len(), 64);

        for token in &tokens {
            assert_eq!(token.len(), 43); // 32 bytes, base64url without padding
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secre7"));
        assert!(!constant_time_eq("secret", "secret-longer"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
