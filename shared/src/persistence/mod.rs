//! # TTL-Bounded Persistence Layer
//!
//! A generic mapping from string keys to typed records with optional
//! per-entry TTL, shared by the three OAuth stores (registered clients,
//! in-flight transactions, issued authorization codes).
//!
//! ## Backends
//!
//! | Backend | TTL mechanism | Selected by |
//! |---------|---------------|-------------|
//! | [`InMemoryStore`] | FIFO expiry queue + periodic reaper | `STORAGE_BACKEND=memory` |
//! | [`RedisStore`] | native expire-on-write (`SET ... EX`) | `STORAGE_BACKEND=redis` |
//! | [`CatalystCacheStore`] | cache segment expiry in hours | `STORAGE_BACKEND=catalyst` |
//!
//! All three serialize values to canonical JSON strings on write and parse
//! on read, so a record round-trips identically regardless of backend and
//! the backends stay interchangeable for every record type.
//!
//! ## Reaper
//!
//! The in-memory backend does not expire entries by itself; a single
//! long-lived task ([`spawn_ttl_reaper`]) sweeps every in-memory store on
//! a fixed period. The task only ends when it is aborted at shutdown.

mod catalyst;
mod memory;
mod redis;

pub use catalyst::CatalystCacheStore;
pub use memory::InMemoryStore;
pub use redis::RedisStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::{ApiError, ApiResult};
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often the reaper sweeps in-memory stores.
pub const REAPER_PERIOD: Duration = Duration::from_secs(60);

// =============================================================================
// Store Contract
// =============================================================================

/// Key → typed-record mapping with optional TTL.
///
/// ## Contract
///
/// - `set` overwrites; a positive `ttl` makes the entry unreadable after
///   that duration at the latest
/// - `get` never returns an expired entry
/// - `delete` is idempotent
///
/// Storage failures surface as 500-class [`ApiError`]s, never as canonical
/// OAuth error codes.
#[async_trait]
pub trait KeyValueStore<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Stores the record, replacing any previous value for `key`.
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> ApiResult<()>;

    /// Retrieves and deserializes the record, or `None` if absent/expired.
    async fn get(&self, key: &str) -> ApiResult<Option<T>>;

    /// Removes the key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> ApiResult<()>;
}

/// Eviction hook for stores whose TTLs are enforced by the reaper.
pub trait SweepExpired: Send + Sync {
    /// Removes entries whose deadline has passed; returns the count removed.
    fn sweep_expired(&self) -> usize;
}

// =============================================================================
// Factory
// =============================================================================

/// Builds stores for the backend selected by `STORAGE_BACKEND` and keeps
/// track of in-memory stores so the reaper can sweep them.
pub struct StoreFactory {
    backend: StorageBackend,
    redis: Option<ConnectionManager>,
    storage: StorageConfig,
    accounts_url: String,
    http: reqwest::Client,
    sweepers: Mutex<Vec<Arc<dyn SweepExpired>>>,
}

impl StoreFactory {
    /// Creates the factory.
    ///
    /// `redis` must be the shared connection manager when the backend is
    /// Redis; `accounts_url` is the OAuth token endpoint host used by the
    /// Catalyst backend to refresh its cache access token.
    pub fn new(
        storage: &StorageConfig,
        redis: Option<ConnectionManager>,
        accounts_url: &str,
    ) -> Self {
        Self {
            backend: storage.backend,
            redis,
            storage: storage.clone(),
            accounts_url: accounts_url.to_string(),
            http: reqwest::Client::new(),
            sweepers: Mutex::new(Vec::new()),
        }
    }

    /// Builds a store for one record type under the given key scope.
    pub fn build<T>(&self, scope: &str) -> ApiResult<Arc<dyn KeyValueStore<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match self.backend {
            StorageBackend::Memory => {
                let store = Arc::new(InMemoryStore::<T>::new());
                self.sweepers
                    .lock()
                    .unwrap()
                    .push(store.clone() as Arc<dyn SweepExpired>);
                Ok(store)
            }
            StorageBackend::Redis => {
                let conn = self.redis.clone().ok_or_else(|| ApiError::Internal {
                    message: "redis backend selected but no connection was established".into(),
                })?;
                Ok(Arc::new(RedisStore::<T>::new(conn, scope)))
            }
            StorageBackend::Catalyst => Ok(Arc::new(CatalystCacheStore::<T>::new(
                self.http.clone(),
                &self.storage.catalyst,
                &self.accounts_url,
                scope,
            ))),
        }
    }

    /// In-memory stores created so far, for the reaper.
    pub fn sweepers(&self) -> Vec<Arc<dyn SweepExpired>> {
        self.sweepers.lock().unwrap().clone()
    }
}

// =============================================================================
// Reaper (C2)
// =============================================================================

/// Starts the periodic TTL reaper for in-memory stores.
///
/// The task runs until aborted; the caller aborts it at shutdown and
/// awaits the handle. With a non-memory backend `stores` is empty and the
/// task has nothing to do.
pub fn spawn_ttl_reaper(
    stores: Vec<Arc<dyn SweepExpired>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for store in &stores {
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(removed, "TTL reaper evicted expired entries");
                }
            }
        }
    })
}
