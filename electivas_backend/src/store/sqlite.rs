use super::{parse_counter, KeyValueStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;

    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
"#;

/// Durable store backed by a single SQLite table.
///
/// All access goes through one connection behind a mutex, which is what makes
/// `increment`/`decrement` atomic.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    newly_created: bool,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let newly_created = !path.exists();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            newly_created,
        }
    }

    /// Creates the schema if needed. Returns whether the database file was
    /// created by this process.
    pub fn ensure_migrations(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    pub fn key_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("store mutex poisoned"))?;
        f(&guard)
    }

    fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let current = read_value(conn, key)?
                .map(|raw| parse_counter(key, &raw))
                .transpose()?
                .unwrap_or(0);
            let next = current + delta;
            write_value(conn, key, &next.to_string())?;
            Ok(next)
        })
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO kv (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, value, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| read_value(conn, key))
    }

    async fn set_raw(&self, key: &str, value: Option<String>) -> Result<()> {
        self.with_conn(|conn| match value {
            Some(value) => write_value(conn, key, &value),
            None => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(())
            }
        })
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.adjust(key, 1)
    }

    async fn decrement(&self, key: &str) -> Result<i64> {
        self.adjust(key, -1)
    }
}
