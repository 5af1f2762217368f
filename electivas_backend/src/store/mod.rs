pub mod memory;
pub mod redis;
pub mod sqlite;

pub use self::redis::RedisStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Raw key-value backend shared by every moderation component.
///
/// Values are JSON text. Counters touched through `increment`/`decrement` are
/// stored as plain decimal integers, which are also valid JSON, so a counter
/// can be read back through [`Kv::get`]. Both counter operations must be
/// atomic with respect to each other; nothing else is.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`; `None` removes the key.
    async fn set_raw(&self, key: &str, value: Option<String>) -> Result<()>;

    /// Adds one to the counter under `key` (missing keys start at 0).
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Subtracts one from the counter under `key` (missing keys start at 0).
    async fn decrement(&self, key: &str) -> Result<i64>;
}

/// Typed, cloneable handle over a [`KeyValueStore`].
#[derive(Clone)]
pub struct Kv {
    inner: Arc<dyn KeyValueStore>,
}

impl Kv {
    pub fn new<S>(store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        Self {
            inner: Arc::new(store),
        }
    }

    /// In-process store, mostly for tests and throwaway deployments.
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.inner.get_raw(key).await? else {
            return Ok(None);
        };
        serde_json::from_str::<Option<T>>(&raw)
            .with_context(|| format!("malformed value stored under {key}"))
    }

    /// Serializes `value` as JSON. A value that serializes to `null` clears
    /// the key instead of storing it.
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("failed to encode value for {key}"))?;
        let raw = if raw == "null" { None } else { Some(raw) };
        self.inner.set_raw(key, raw).await
    }

    pub async fn clear(&self, key: &str) -> Result<()> {
        self.inner.set_raw(key, None).await
    }

    /// Reads a counter, treating a missing key as zero.
    pub async fn counter(&self, key: &str) -> Result<i64> {
        Ok(self.get::<i64>(key).await?.unwrap_or(0))
    }

    /// Reads a boolean flag, treating a missing key as `false`.
    pub async fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.get::<bool>(key).await?.unwrap_or(false))
    }

    pub async fn increment(&self, key: &str) -> Result<i64> {
        self.inner.increment(key).await
    }

    pub async fn decrement(&self, key: &str) -> Result<i64> {
        self.inner.decrement(key).await
    }

    /// Atomic decrement that never leaves the counter below zero.
    ///
    /// The clamp is a second write, so a concurrent increment between the two
    /// calls can be overwritten. Counters only dip below zero when the
    /// signals disagree, so the window is accepted.
    pub async fn decrement_floored(&self, key: &str) -> Result<i64> {
        let value = self.inner.decrement(key).await?;
        if value < 0 {
            tracing::debug!(key, value, "counter dipped below zero, clamping");
            self.set(key, &0i64).await?;
            return Ok(0);
        }
        Ok(value)
    }
}

pub(crate) fn parse_counter(key: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .with_context(|| format!("value under {key} is not an integer counter"))
}
