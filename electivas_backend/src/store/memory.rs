use super::{parse_counter, KeyValueStore};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(raw) => parse_counter(key, raw)?,
            None => 0,
        };
        let next = current + delta;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Option<String>) -> Result<()> {
        let mut entries = self.entries.write().await;
        match value {
            Some(value) => {
                entries.insert(key.to_string(), value);
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.adjust(key, 1).await
    }

    async fn decrement(&self, key: &str) -> Result<i64> {
        self.adjust(key, -1).await
    }
}
