//! In-memory persistence backend.
//!
//! Entries live in a map guarded by a single mutex; TTLs are tracked twice:
//!
//! - each entry carries its own deadline, so `get` can refuse expired
//!   values immediately, and
//! - a FIFO queue of `(deadline, key)` pairs feeds the periodic reaper,
//!   which pops expired heads and frees the map entries.
//!
//! Values round-trip through canonical JSON strings so behavior matches
//! the externalized backends exactly.

use super::{KeyValueStore, SweepExpired};
use crate::errors::{ApiError, ApiResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    payload: String,
    deadline: Option<Instant>,
}

struct Inner {
    entries: HashMap<String, Entry>,
    // FIFO of (deadline, key); TTLs are uniform per store, so push order
    // is deadline order and the reaper only ever inspects the head.
    expiry_queue: VecDeque<(Instant, String)>,
}

/// Process-local store for one record type.
pub struct InMemoryStore<T> {
    inner: Mutex<Inner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                expiry_queue: VecDeque::new(),
            }),
            _marker: PhantomData,
        }
    }

    fn set_at(&self, key: &str, payload: String, ttl: Option<Duration>, now: Instant) {
        let deadline = ttl.filter(|d| !d.is_zero()).map(|d| now + d);
        let mut inner = self.inner.lock().unwrap();
        if let Some(deadline) = deadline {
            inner.expiry_queue.push_back((deadline, key.to_string()));
        }
        inner.entries.insert(key.to_string(), Entry { payload, deadline });
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entries.get(key)?;
        // Expired entries are invisible even before the reaper frees them.
        if matches!(entry.deadline, Some(deadline) if deadline <= now) {
            return None;
        }
        Some(entry.payload.clone())
    }

    fn remove(&self, key: &str) {
        self.inner.lock().unwrap().entries.remove(key);
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut removed = 0;
        while matches!(inner.expiry_queue.front(), Some((deadline, _)) if *deadline <= now) {
            let (_, key) = inner.expiry_queue.pop_front().unwrap();
            // The key may have been overwritten with a later deadline (or
            // deleted); only evict when the live entry itself is expired.
            let evict = matches!(
                inner.entries.get(&key),
                Some(entry) if matches!(entry.deadline, Some(deadline) if deadline <= now)
            );
            if evict {
                inner.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> KeyValueStore<T> for InMemoryStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> ApiResult<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;
        self.set_at(key, payload, ttl, Instant::now());
        Ok(())
    }

    async fn get(&self, key: &str) -> ApiResult<Option<T>> {
        match self.get_at(key, Instant::now()) {
            Some(payload) => {
                let value = serde_json::from_str(&payload)
                    .map_err(|e| ApiError::Storage { message: e.to_string() })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> ApiResult<()> {
        self.remove(key);
        Ok(())
    }
}

impl<T> SweepExpired for InMemoryStore<T>
where
    T: Send + Sync,
{
    fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }
}

// =============================================================================
// Tests
// =============================================================================
