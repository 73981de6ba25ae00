//! Redis persistence backend.
//!
//! Keys are namespaced as `"<scope>:<key>"`; TTLs use the native
//! expire-on-write facility (`SET ... EX`), so no reaper is involved and
//! expiry is enforced by the Redis server across the whole cluster.

use super::KeyValueStore;
use crate::errors::{ApiError, ApiResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;

/// Redis-backed store for one record type.
pub struct RedisStore<T> {
    conn: ConnectionManager,
    prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RedisStore<T> {
    pub fn new(conn: ConnectionManager, scope: &str) -> Self {
        Self {
            conn,
            prefix: scope.to_string(),
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &str) -> String {
        scoped_key(&self.prefix, key)
    }
}

fn scoped_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

#[async_trait]
impl<T> KeyValueStore<T> for RedisStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> ApiResult<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| ApiError::Storage { message: e.to_string() })?;
        let full_key = self.full_key(key);
        let mut conn = self.conn.clone();

        match ttl.filter(|d| !d.is_zero()) {
            Some(ttl) => {
                // Sub-second TTLs round up so the entry is expirable at all.
                let seconds = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(&full_key, &payload, seconds).await?;
            }
            None => {
                conn.set::<_, _, ()>(&full_key, &payload).await?;
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> ApiResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.full_key(key)).await?;

        match raw {
            Some(payload) => {
                let value = serde_json::from_str(&payload)
                    .map_err(|e| ApiError::Storage { message: e.to_string() })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> ApiResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.full_key(key)).await?;
        Ok(())
    }
}

// Hide connection internals in Debug output
impl<T> std::fmt::Debug for RedisStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
