//! In-process token bucket on the monotonic clock.
//!
//! Per call, with `now` in monotonic seconds:
//!
//! 1. Unknown key → create a bucket holding `capacity - requested` tokens
//!    and admit (the first request is always admitted).
//! 2. Key idle past `entry_ttl_seconds` → reset the bucket the same way.
//! 3. Otherwise refill: `tokens = min(capacity, tokens + elapsed * rate)`.
//! 4. Too few tokens → deny **without touching `last_access`** — a denied
//!    request must not keep an abusive client's entry alive, or it could
//!    self-renew forever and defeat eviction.
//! 5. Otherwise consume, stamp `last_access`, admit.
//!
//! `cleanup()` drops entries whose last *admitted* request is older than
//! the entry TTL.

use super::RateLimiter;
use crate::errors::ApiResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: f64,
    last_access: f64,
}

/// Token bucket map for one `(capacity, window_seconds)` configuration.
pub struct InMemoryTokenBucket {
    capacity: u32,
    /// Tokens per second
    refill_rate: f64,
    entry_ttl_seconds: f64,
    /// Anchor for the monotonic clock; all bucket timestamps are seconds
    /// since this instant.
    origin: Instant,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryTokenBucket {
    /// Creates a limiter with the default one-hour idle-entry TTL.
    pub fn new(capacity: u32, window_seconds: u64) -> Self {
        Self::with_entry_ttl(capacity, window_seconds, 3600)
    }

    pub fn with_entry_ttl(capacity: u32, window_seconds: u64, entry_ttl_seconds: u64) -> Self {
        Self {
            capacity,
            refill_rate: capacity as f64 / window_seconds as f64,
            entry_ttl_seconds: entry_ttl_seconds as f64,
            origin: Instant::now(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn allow_tokens_at(&self, key: &str, requested: u32, now: f64) -> bool {
        let requested = requested as f64;
        let mut buckets = self.buckets.lock().unwrap();

        let needs_reset = match buckets.get(key) {
            Some(bucket) => now - bucket.last_access > self.entry_ttl_seconds,
            None => true,
        };

        if needs_reset {
            // New or stale key: start from a full bucket.
            buckets.insert(
                key.to_string(),
                Bucket {
                    tokens: self.capacity as f64,
                    last_refill: now,
                    last_access: now,
                },
            );
        }

        let bucket = buckets.get_mut(key).unwrap();

        if !needs_reset {
            let elapsed = now - bucket.last_refill;
            if elapsed > 0.0 {
                bucket.tokens =
                    (bucket.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
                bucket.last_refill = now;
            }
        }

        if bucket.tokens < requested {
            // Denied: last_access stays untouched.
            return false;
        }

        bucket.tokens -= requested;
        bucket.last_access = now;
        true
    }

    fn cleanup_at(&self, now: f64) -> usize {
        let mut buckets = self.buckets.lock().unwrap();
        let before = buckets.len();
        buckets.retain(|_, bucket| now - bucket.last_access <= self.entry_ttl_seconds);
        before - buckets.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryTokenBucket {
    async fn allow_tokens(&self, key: &str, tokens: u32) -> ApiResult<bool> {
        Ok(self.allow_tokens_at(key, tokens, self.now()))
    }

    fn cleanup(&self) -> usize {
        self.cleanup_at(self.now())
    }
}

// =============================================================================
// Tests
// =============================================================================
// The *_at variants take the clock explicitly, so refill and TTL behavior
// is tested against a synthetic timeline instead of real sleeps.

#[cfg(test)]
mod tests {
    use super::*;

    fn make_limiter(capacity: u32, window_seconds: u64, ttl: u64) -> InMemoryTokenBucket {
        InMemoryTokenBucket::with_entry_ttl(capacity, window_seconds, ttl)
    }

    #[test]
    fn test_first_request_always_allowed() {
        let limiter = make_limiter(5, 10, 3600);
        assert!(limiter.allow_tokens_at("user1", 1, 1000.0));
    }

    #[test]
    fn test_requests_within_capacity_are_allowed() {
        let limiter = make_limiter(5, 10, 3600);
        for _ in 0..5 {
            assert!(limiter.allow_tokens_at("user1", 1, 1000.0));
        }
    }

    #[test]
    fn test_request_exceeding_capacity_is_denied() {
        let limiter = make_limiter(3, 10, 3600);
        for _ in 0..3 {
            assert!(limiter.allow_tokens_at("user1", 1, 1000.0));
        }
        assert!(!limiter.allow_tokens_at("user1", 1, 1000.0));
    }

    #[test]
    fn test_different_keys_are_isolated() {
        let limiter = make_limiter(2, 10, 3600);
        limiter.allow_tokens_at("user1", 1, 1000.0);
        limiter.allow_tokens_at("user1", 1, 1000.0);

        // user1 is exhausted, user2 should still be admitted
        assert!(!limiter.allow_tokens_at("user1", 1, 1000.0));
        assert!(limiter.allow_tokens_at("user2", 1, 1000.0));
    }

    #[test]
    fn test_tokens_refill_over_a_full_window() {
        let limiter = make_limiter(2, 10, 3600);

        limiter.allow_tokens_at("user1", 1, 1000.0);
        limiter.allow_tokens_at("user1", 1, 1000.0);
        assert!(!limiter.allow_tokens_at("user1", 1, 1000.0)); // exhausted

        // A full window later the bucket is full again
        assert!(limiter.allow_tokens_at("user1", 1, 1010.0));
    }

    #[test]
    fn test_partial_refill_grants_correct_tokens() {
        // capacity 4 over 10 s → rate 0.4 tokens/s
        let limiter = make_limiter(4, 10, 3600);

        for _ in 0..4 {
            assert!(limiter.allow_tokens_at("user1", 1, 1000.0));
        }
        assert!(!limiter.allow_tokens_at("user1", 1, 1000.0));

        // 5 s later exactly 2 tokens have refilled
        assert!(limiter.allow_tokens_at("user1", 1, 1005.0));
        assert!(limiter.allow_tokens_at("user1", 1, 1005.0));
        assert!(!limiter.allow_tokens_at("user1", 1, 1005.0));
    }

    #[test]
    fn test_stale_entry_resets_to_fresh_bucket() {
        let limiter = make_limiter(2, 10, 30);

        limiter.allow_tokens_at("user1", 1, 1000.0);
        limiter.allow_tokens_at("user1", 1, 1000.0);
        assert!(!limiter.allow_tokens_at("user1", 1, 1000.0));

        // Past the entry TTL the key behaves like a first request
        assert!(limiter.allow_tokens_at("user1", 1, 1031.0));
    }

    #[test]
    fn test_allow_tokens_consumes_multiple_tokens() {
        let limiter = make_limiter(5, 10, 3600);
        assert!(limiter.allow_tokens_at("user1", 3, 1000.0)); // 5 -> 2
        assert!(!limiter.allow_tokens_at("user1", 3, 1000.0)); // only 2 left
        assert!(limiter.allow_tokens_at("user1", 2, 1000.0)); // exact drain
    }

    #[test]
    fn test_denied_request_does_not_extend_last_access() {
        // capacity 1, slow refill, 1 s entry TTL
        let limiter = make_limiter(1, 60, 1);

        assert!(limiter.allow_tokens_at("key1", 1, 1000.0)); // consumes the token

        // A denial shortly after must not refresh the entry's liveness
        assert!(!limiter.allow_tokens_at("key1", 1, 1000.5));
        {
            let buckets = limiter.buckets.lock().unwrap();
            assert_eq!(buckets["key1"].last_access, 1000.0);
        }

        // Still within TTL of the last *admitted* request: kept
        assert_eq!(limiter.cleanup_at(1000.5), 0);

        // Beyond the TTL measured from the admitted request: reaped, even
        // though the denied request was more recent
        assert_eq!(limiter.cleanup_at(1002.0), 1);
        assert!(limiter.buckets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_removes_only_idle_entries() {
        let limiter = make_limiter(5, 10, 30);

        limiter.allow_tokens_at("old_key", 1, 1000.0);
        limiter.allow_tokens_at("fresh_key", 1, 1000.0);
        limiter.allow_tokens_at("fresh_key", 1, 1031.0); // touch fresh_key

        let removed = limiter.cleanup_at(1031.0);
        assert_eq!(removed, 1);

        let buckets = limiter.buckets.lock().unwrap();
        assert!(!buckets.contains_key("old_key"));
        assert!(buckets.contains_key("fresh_key"));
    }

    #[test]
    fn test_cleanup_returns_zero_when_nothing_expired() {
        let limiter = make_limiter(5, 10, 3600);
        limiter.allow_tokens_at("key", 1, 1000.0);
        assert_eq!(limiter.cleanup_at(1000.0), 0);
    }
}
