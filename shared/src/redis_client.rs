//! # Shared Redis Connection
//!
//! One `ConnectionManager` is created at startup and cloned into every
//! component that talks to Redis (the persistence stores and the rate
//! limiter). The manager holds a single multiplexed connection and
//! reconnects automatically on failure, which is more resilient than a
//! plain connection for a long-running service.
//!
//! ## Key Naming Convention
//!
//! | Pattern | Example | Purpose |
//! |---------|---------|---------|
//! | `registered_clients:{client_id}` | `registered_clients:9d3f...` | DCR client records |
//! | `auth_transactions:{txn_id}` | `auth_transactions:b1c2...` | In-flight authorize requests |
//! | `auth_codes:{code}` | `auth_codes:XyZ...` | Proxy-issued one-time codes |
//! | `rl:{key}` | `rl:/token:203.0.113.9` | Rate-limiter buckets |

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use tracing::info;

/// Establishes the shared Redis connection.
///
/// ## Errors
///
/// Returns `ApiError::RedisError` if the URL is invalid, the server is
/// unreachable, or authentication fails.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager, ApiError> {
    info!(host = %config.host, port = config.port, "Connecting to Redis");

    let client = redis::Client::open(config.url())?;
    let manager = ConnectionManager::new(client).await?;

    info!("Redis connection established");
    Ok(manager)
}
