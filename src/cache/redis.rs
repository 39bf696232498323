//! Redis cache backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

use super::{CacheBackend, Result};

/// Redis connection shared between clones; reconnects on failure.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `address`, e.g. `redis://127.0.0.1/`.
    pub async fn connect(address: &str) -> Result<Self> {
        let client = redis::Client::open(address)?;
        let connection = client.get_connection_manager().await?;

        tracing::info!(%address, "redis connected");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn set(
        &self,
        entries: &[(String, String)],
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        // EXAT rejects non-positive timestamps; 1 expires immediately.
        let expire_at = expire_at.timestamp().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EXAT")
                .arg(expire_at)
                .ignore();
        }

        let mut connection = self.connection.clone();
        let () = pipe.query_async(&mut connection).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await?;

        Ok(value)
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        let mut connection = self.connection.clone();
        let count: usize = redis::cmd("EXISTS")
            .arg(keys)
            .query_async(&mut connection)
            .await?;

        Ok(count == keys.len())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let _: usize = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut connection)
            .await?;

        Ok(())
    }
}
