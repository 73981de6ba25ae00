//! # Token-Bucket Rate Limiting
//!
//! Admission control with two interchangeable backends sharing one
//! contract: a bucket of `capacity` tokens refills linearly over
//! `window_seconds`, each admitted request consumes tokens, and a request
//! that finds too few tokens is denied.
//!
//! ```text
//!  capacity ┐  ____________
//!           │ /
//!   tokens  │/   refill rate = capacity / window_seconds
//!           │
//!         0 └──────────────────▶ time
//! ```
//!
//! | Backend | Clock | Idle-entry eviction |
//! |---------|-------|---------------------|
//! | [`InMemoryTokenBucket`] | monotonic `Instant` | periodic `cleanup()` task |
//! | [`RedisTokenBucket`] | Redis server `TIME` | per-key `PEXPIRE` |
//!
//! The two clock sources are never mixed: the in-process limiter never
//! consults wall time, and the Lua script never consults the caller's
//! clock.
//!
//! ## Registry
//!
//! [`RateLimiterRegistry`] caches one limiter per `(capacity,
//! window_seconds)` pair for the process lifetime. Construction is guarded
//! by an async mutex with a double-checked lookup so two concurrent
//! requests cannot build duplicate backends.

mod client_ip;
mod memory;
mod redis;

pub use client_ip::client_ip;
pub use memory::InMemoryTokenBucket;
pub use redis::RedisTokenBucket;

use crate::errors::ApiResult;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often idle in-process buckets are swept.
pub const CLEANUP_PERIOD: Duration = Duration::from_secs(60);

// =============================================================================
// Limiter Contract
// =============================================================================

/// Token-bucket admission decision per key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admits or denies a single request for `key`.
    async fn allow(&self, key: &str) -> ApiResult<bool> {
        self.allow_tokens(key, 1).await
    }

    /// Admits or denies a request consuming `tokens` tokens atomically.
    async fn allow_tokens(&self, key: &str, tokens: u32) -> ApiResult<bool>;

    /// Evicts idle entries and returns the count removed.
    ///
    /// Redis buckets expire server-side via `PEXPIRE`, so the Redis
    /// backend has nothing to sweep.
    fn cleanup(&self) -> usize {
        0
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Which backend newly built limiters use.
#[derive(Clone)]
pub enum LimiterBackend {
    /// Process-local buckets on the monotonic clock
    Memory,
    /// Cluster-wide buckets driven by a server-side script
    Redis(ConnectionManager),
}

/// Process-wide cache of limiter instances keyed by
/// `(capacity, window_seconds)`.
pub struct RateLimiterRegistry {
    backend: LimiterBackend,
    cache: RwLock<HashMap<(u32, u64), Arc<dyn RateLimiter>>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl RateLimiterRegistry {
    pub fn new(backend: LimiterBackend) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the limiter for `(capacity, window_seconds)`, building it on
    /// first use.
    ///
    /// Double-checked: the fast path is a shared read; on a miss the build
    /// lock is taken and the cache re-checked before constructing, so
    /// concurrent first requests share one instance.
    pub async fn get_or_build(&self, capacity: u32, window_seconds: u64) -> Arc<dyn RateLimiter> {
        let cache_key = (capacity, window_seconds);

        if let Some(limiter) = self.cache.read().unwrap().get(&cache_key) {
            return limiter.clone();
        }

        let _guard = self.build_lock.lock().await;
        if let Some(limiter) = self.cache.read().unwrap().get(&cache_key) {
            return limiter.clone();
        }

        let limiter: Arc<dyn RateLimiter> = match &self.backend {
            LimiterBackend::Memory => Arc::new(InMemoryTokenBucket::new(capacity, window_seconds)),
            LimiterBackend::Redis(conn) => {
                Arc::new(RedisTokenBucket::new(conn.clone(), capacity, window_seconds))
            }
        };

        self.cache
            .write()
            .unwrap()
            .insert(cache_key, limiter.clone());
        limiter
    }

    /// All limiters built so far, for the cleanup task.
    pub fn limiters(&self) -> Vec<Arc<dyn RateLimiter>> {
        self.cache.read().unwrap().values().cloned().collect()
    }
}

// =============================================================================
// Cleanup Task
// =============================================================================

/// Starts the periodic idle-bucket sweep over every registered limiter.
///
/// Runs until aborted at shutdown.
pub fn spawn_cleanup_task(
    registry: Arc<RateLimiterRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for limiter in registry.limiters() {
                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!(removed, "Rate limiter cleanup removed idle buckets");
                }
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
