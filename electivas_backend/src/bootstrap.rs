use crate::config::{ElectivasConfig, StoreBackend};
use crate::store::{Kv, RedisStore, SqliteStore};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    /// True when this run created the SQLite file. Always false for the
    /// memory and Redis backends.
    pub store_initialized: bool,
    pub kv: Kv,
}

/// Prepares the configured store. Only SQLite touches the filesystem.
pub async fn initialize(config: &ElectivasConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();

    let (kv, store_initialized) = match config.store {
        StoreBackend::Memory => (Kv::memory(), false),
        StoreBackend::Sqlite => {
            create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;
            create_dir_if_missing(&config.paths.logs_dir, &mut directories_created)?;
            let store = SqliteStore::open(&config.paths.db_path)?;
            let created = store
                .ensure_migrations()
                .context("failed to apply store migrations")?;
            (Kv::new(store), created)
        }
        StoreBackend::Redis => (Kv::new(RedisStore::connect(&config.redis_url).await?), false),
    };

    Ok(BootstrapResources {
        directories_created,
        store_initialized,
        kv,
    })
}

fn create_dir_if_missing(path: &Path, created: &mut Vec<String>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        created.push(path.display().to_string());
    }
    Ok(())
}
