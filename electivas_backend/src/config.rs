use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str =
    "https://ceitba.org.ar/api/v1/scheduler/subjects?plan=S10-Rev23";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone)]
pub struct ElectivasConfig {
    pub api_port: u16,
    pub paths: ElectivasPaths,
    pub store: StoreBackend,
    /// Only read when `store` is [`StoreBackend::Redis`].
    pub redis_url: String,
    pub moderation: ModerationConfig,
    pub admin: AdminConfig,
    pub catalog: CatalogConfig,
}

impl ElectivasConfig {
    pub fn from_env() -> Result<Self> {
        let paths = ElectivasPaths::discover()?;
        let api_port = env::var("ELECTIVAS_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);
        Ok(Self {
            api_port,
            paths,
            store: StoreBackend::from_env(),
            redis_url: env::var("REDIS_URL")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            moderation: ModerationConfig::from_env(),
            admin: AdminConfig::from_env(),
            catalog: CatalogConfig::from_env(),
        })
    }

    /// Config with default policy, used by tests and embedders.
    pub fn new(api_port: u16, paths: ElectivasPaths, store: StoreBackend) -> Self {
        Self {
            api_port,
            paths,
            store,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            moderation: ModerationConfig::default(),
            admin: AdminConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
    Redis,
}

impl StoreBackend {
    /// Unknown values fall back to SQLite.
    pub fn from_env() -> Self {
        env::var("ELECTIVAS_STORE")
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(backend) => Some(backend),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring ELECTIVAS_STORE");
                    None
                }
            })
            .unwrap_or_default()
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(anyhow!("unknown store backend: {other}")),
        }
    }
}

/// Moderation policy knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationConfig {
    pub comment_max_length: usize,
    pub comment_min_length: usize,
    pub report_threshold: i64,
    pub comments_per_subject_limit: i64,
    pub comments_per_subject_ip_limit: i64,
    /// Whether the raw ip/fingerprint are kept on stored comments.
    pub track_comment_identity: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            comment_max_length: 3000,
            comment_min_length: 10,
            report_threshold: 5,
            comments_per_subject_limit: 2,
            comments_per_subject_ip_limit: 20,
            track_comment_identity: true,
        }
    }
}

impl ModerationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            comment_max_length: positive_var("COMMENT_MAX_LENGTH", defaults.comment_max_length),
            comment_min_length: positive_var("COMMENT_MIN_LENGTH", defaults.comment_min_length),
            report_threshold: positive_var("REPORT_THRESHOLD", defaults.report_threshold),
            comments_per_subject_limit: positive_var(
                "COMMENTS_PER_SUBJECT_LIMIT",
                defaults.comments_per_subject_limit,
            ),
            comments_per_subject_ip_limit: positive_var(
                "COMMENTS_PER_SUBJECT_IP_LIMIT",
                defaults.comments_per_subject_ip_limit,
            ),
            // Tracking stays on unless explicitly disabled
            track_comment_identity: env::var("TRACK_COMMENT_IDENTITY")
                .ok()
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(defaults.track_comment_identity),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub secret: Option<String>,
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let secret = env::var("ADMIN_SECRET_KEY")
            .ok()
            .filter(|raw| !raw.trim().is_empty());
        Self { secret }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub url: String,
    pub ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        let url = env::var("CATALOG_URL")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());
        let ttl = Duration::from_secs(positive_var("CATALOG_TTL_SECS", 60 * 60));
        Self { url, ttl }
    }
}

/// Reads a numeric variable where zero, negative or unparsable values fall
/// back to `default`.
fn positive_var<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    parse_positive(env::var(key).ok().as_deref(), default)
}

fn parse_positive<T>(raw: Option<&str>, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    raw.and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ElectivasPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl ElectivasPaths {
    /// `ELECTIVAS_HOME` if set, otherwise the directory holding the binary.
    pub fn discover() -> Result<Self> {
        if let Some(home) = env::var_os("ELECTIVAS_HOME") {
            return Self::from_base_dir(PathBuf::from(home));
        }
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("electivas.db");
        let logs_dir = base.join("logs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            logs_dir,
        })
    }
}
