//! Redis-backed token bucket.
//!
//! One server-side script runs atomically per call, so concurrent
//! requests across the whole cluster see a consistent bucket. The script
//! reads the Redis server clock (`TIME`) — never the caller's clock — and
//! works in milliseconds.
//!
//! Each bucket key also gets a `PEXPIRE` of the time it takes to refill
//! from empty to full, so idle buckets evict themselves without any
//! cleanup task.

use super::RateLimiter;
use crate::errors::ApiResult;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

/// Bucket state lives in a hash under `rl:<key>`:
/// `tokens` (fractional) and `last_refill` (server ms).
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]

local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2]) -- tokens per millisecond
local requested = tonumber(ARGV[3])

-- Use Redis server time
local now_data = redis.call("TIME")
local now = now_data[1] * 1000 + math.floor(now_data[2] / 1000)

-- Get existing bucket
local bucket = redis.call("HMGET", key, "tokens", "last_refill")
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if tokens == nil then
    tokens = capacity
    last_refill = now
else
    -- Refill tokens
    local delta = now - last_refill
    local refill = delta * refill_rate
    tokens = math.min(capacity, tokens + refill)
    last_refill = now
end

local allowed = 0

if tokens >= requested then
    tokens = tokens - requested
    allowed = 1
end

-- Save state
redis.call("HMSET", key,
    "tokens", tokens,
    "last_refill", last_refill
)

-- Auto-expire bucket (idle cleanup)
-- TTL = time to fully refill from empty
local ttl = math.ceil(capacity / refill_rate)
redis.call("PEXPIRE", key, ttl)

return allowed
"#;

/// Cluster-wide token bucket for one `(capacity, window_seconds)`
/// configuration.
pub struct RedisTokenBucket {
    conn: ConnectionManager,
    capacity: u32,
    /// Tokens per millisecond
    refill_rate: f64,
    script: Script,
}

impl RedisTokenBucket {
    pub fn new(conn: ConnectionManager, capacity: u32, window_seconds: u64) -> Self {
        Self {
            conn,
            capacity,
            refill_rate: capacity as f64 / (window_seconds * 1000) as f64,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisTokenBucket {
    async fn allow_tokens(&self, key: &str, tokens: u32) -> ApiResult<bool> {
        let mut conn = self.conn.clone();

        let allowed: i64 = self
            .script
            .key(format!("rl:{}", key))
            .arg(self.capacity)
            .arg(self.refill_rate)
            .arg(tokens)
            .invoke_async(&mut conn)
            .await?;

        Ok(allowed == 1)
    }
}

impl std::fmt::Debug for RedisTokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish_non_exhaustive()
    }
}
