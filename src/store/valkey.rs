//! Valkey/Redis store using the fred client.

use async_trait::async_trait;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface, SortedSetsInterface};
use fred::types::config::Config;
use fred::types::Expiration;
use std::time::Duration;
use tracing::{debug, info};

use super::{OrderedSetStore, SessionStore};
use crate::error::{Result, SessionError};

impl From<fred::error::Error> for SessionError {
    fn from(err: fred::error::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}

/// A store backed by a pooled Valkey/Redis connection.
pub struct ValkeyStore {
    pool: Pool,
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore").finish_non_exhaustive()
    }
}

impl ValkeyStore {
    /// Connect to the server at `url` with `pool_size` connections.
    #[tracing::instrument(skip(url), err)]
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self> {
        let config = Config::from_url(url)?;
        let pool = Pool::new(config, None, None, None, pool_size.max(1))?;
        pool.init().await?;

        info!("Connected to valkey");
        Ok(Self { pool })
    }

    /// Close every pooled connection.
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for ValkeyStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value: Option<Vec<u8>> = self.pool.get(key).await?;
        value.ok_or_else(|| SessionError::NotFound { key: key.to_string() })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expiration = if ttl.is_zero() {
            None
        } else {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            Some(Expiration::PX(millis.max(1)))
        };
        debug!(key = %key, bytes = value.len(), ttl_ms = ttl.as_millis() as u64, "SET");
        self.pool
            .set::<(), _, _>(key, value, expiration, None, false)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed: i64 = self.pool.del(key).await?;
        debug!(key = %key, removed = removed, "DEL");
        Ok(())
    }

    fn ordered_set(&self) -> Option<&dyn OrderedSetStore> {
        Some(self)
    }
}

#[async_trait]
impl OrderedSetStore for ValkeyStore {
    async fn add_scored(&self, set_key: &str, member: &str, score: f64) -> Result<()> {
        self.pool
            .zadd::<i64, _, _>(set_key, None, None, false, false, (score, member))
            .await?;
        Ok(())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        self.pool.zrem::<i64, _, _>(set_key, member).await?;
        Ok(())
    }

    async fn range_with_scores(&self, set_key: &str) -> Result<Vec<(String, f64)>> {
        let members: Vec<(String, f64)> = self
            .pool
            .zrange(set_key, 0, -1, None, false, None, true)
            .await?;
        Ok(members)
    }
}
