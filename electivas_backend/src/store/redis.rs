use super::KeyValueStore;
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, Client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Shared Redis instance. Values and counters use the same plain string
/// layout as the SQLite table, so an existing dump with this key scheme reads
/// back as-is.
///
/// INCR and DECR are atomic on the server, which covers the trait's counter
/// contract across processes as well.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).context("invalid REDIS_URL")?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));
        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .context("failed to connect to redis")?;
        tracing::info!("connected to redis store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .with_context(|| format!("redis GET {key} failed"))
    }

    async fn set_raw(&self, key: &str, value: Option<String>) -> Result<()> {
        let mut conn = self.conn.clone();
        let written = match value {
            Some(value) => conn.set::<_, _, ()>(key, value).await,
            None => conn.del::<_, ()>(key).await,
        };
        written.with_context(|| format!("redis write to {key} failed"))
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64)
            .await
            .with_context(|| format!("redis INCR {key} failed"))
    }

    async fn decrement(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1i64)
            .await
            .with_context(|| format!("redis DECR {key} failed"))
    }
}
