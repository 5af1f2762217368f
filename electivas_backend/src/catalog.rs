//! Upstream subject catalog, fetched over HTTP and cached with a TTL.
//!
//! The catalog is owned by the web layer. Moderation code only ever sees a
//! subject id and never checks it against this catalog.

use crate::config::CatalogConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: String,
    pub classroom: String,
    pub building: String,
    pub time_from: String,
    pub time_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub name: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub section: String,
    pub subject_id: String,
    pub name: String,
    pub credits: f64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub credits_required: Option<f64>,
    pub course_start: String,
    pub course_end: String,
    #[serde(default)]
    pub commissions: Vec<Commission>,
}

/// category -> year -> semester -> subjects, as served upstream.
pub type CatalogData = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Subject>>>>;

pub const ELECTIVES_CATEGORY: &str = "Electivas";

/// Electives live under year "0", semester "0".
pub fn electives(data: &CatalogData) -> Vec<Subject> {
    data.get(ELECTIVES_CATEGORY)
        .and_then(|years| years.get("0"))
        .and_then(|semesters| semesters.get("0"))
        .cloned()
        .unwrap_or_default()
}

pub fn find_subject(data: &CatalogData, subject_id: &str) -> Option<Subject> {
    data.values()
        .flat_map(|years| years.values())
        .flat_map(|semesters| semesters.values())
        .flat_map(|subjects| subjects.iter())
        .find(|subject| subject.subject_id == subject_id)
        .cloned()
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Single-slot cache whose entry expires `ttl` after it was stored.
pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: RwLock<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: RwLock::new(None),
        }
    }

    /// Returns the cached value while it is younger than the TTL.
    pub async fn get(&self) -> Option<T> {
        let entry = self.entry.read().await;
        let (stored_at, value) = entry.as_ref()?;
        if self.clock.now().duration_since(*stored_at) < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    pub async fn put(&self, value: T) {
        *self.entry.write().await = Some((self.clock.now(), value));
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

#[derive(Clone)]
pub struct SubjectCatalog {
    client: reqwest::Client,
    url: String,
    cache: Arc<TtlCache<Arc<CatalogData>>>,
}

impl SubjectCatalog {
    pub fn new(client: reqwest::Client, config: &CatalogConfig) -> Self {
        Self::with_clock(client, config, Arc::new(SystemClock))
    }

    pub fn with_clock(client: reqwest::Client, config: &CatalogConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            url: config.url.clone(),
            cache: Arc::new(TtlCache::new(config.ttl, clock)),
        }
    }

    /// Stores `data` as if it had just been fetched.
    pub async fn prime(&self, data: CatalogData) {
        self.cache.put(Arc::new(data)).await;
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    pub async fn fetch_all(&self) -> Result<Arc<CatalogData>> {
        if let Some(data) = self.cache.get().await {
            return Ok(data);
        }

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to reach subject catalog at {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("subject catalog returned {status}: {body}");
        }
        let data: CatalogData = response
            .json()
            .await
            .context("subject catalog returned malformed JSON")?;

        let data = Arc::new(data);
        self.cache.put(data.clone()).await;
        tracing::info!(url = %self.url, "subject catalog refreshed");
        Ok(data)
    }

    /// Electives, or an empty list when the catalog cannot be fetched.
    pub async fn electives(&self) -> Vec<Subject> {
        match self.fetch_all().await {
            Ok(data) => electives(&data),
            Err(err) => {
                tracing::error!(error = ?err, "error fetching electives");
                Vec::new()
            }
        }
    }

    pub async fn subject_by_id(&self, subject_id: &str) -> Option<Subject> {
        match self.fetch_all().await {
            Ok(data) => find_subject(&data, subject_id),
            Err(err) => {
                tracing::error!(error = ?err, subject_id = %subject_id, "error fetching subject");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ManualClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }
    }

    const SAMPLE: &str = r#"{
        "Electivas": {
            "0": {
                "0": [{
                    "section": "Electivas",
                    "subject_id": "81.57",
                    "name": "Introducción a la Programación",
                    "credits": 3,
                    "dependencies": ["81.01", "81.02"],
                    "credits_required": null,
                    "course_start": "2025-07-21",
                    "course_end": "2025-12-31",
                    "commissions": [{
                        "name": "A",
                        "schedule": [{
                            "day": "MONDAY",
                            "classroom": "501F",
                            "building": "SDF",
                            "time_from": "19:00:00",
                            "time_to": "22:00:00"
                        }]
                    }]
                }]
            }
        },
        "Ciclo Básico": {
            "1": {
                "1": [{
                    "section": "Ciclo Básico",
                    "subject_id": "93.26",
                    "name": "Análisis Matemático I",
                    "credits": 6,
                    "credits_required": 144,
                    "course_start": "2025-03-10",
                    "course_end": "2025-07-05"
                }]
            }
        }
    }"#;

    fn sample() -> CatalogData {
        serde_json::from_str(SAMPLE).expect("sample catalog")
    }

    #[test]
    fn electives_come_from_year_zero_semester_zero() {
        let data = sample();
        let electives = electives(&data);
        assert_eq!(electives.len(), 1);
        assert_eq!(electives[0].subject_id, "81.57");
        assert_eq!(electives[0].commissions[0].schedule[0].classroom, "501F");
    }

    #[test]
    fn subjects_are_found_in_any_category() {
        let data = sample();
        let subject = find_subject(&data, "93.26").expect("core subject");
        assert_eq!(subject.credits_required, Some(144.0));
        assert!(subject.commissions.is_empty());
        assert!(find_subject(&data, "00.00").is_none());
    }

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(Duration::from_secs(3600), clock.clone());
        assert_eq!(cache.get().await, None::<u32>);

        cache.put(7u32).await;
        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get().await, Some(7));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn invalidate_drops_the_entry() {
        let cache = TtlCache::new(Duration::from_secs(60), Arc::new(SystemClock));
        cache.put("catalog".to_string()).await;
        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn primed_catalog_answers_without_fetching() {
        let config = CatalogConfig {
            url: "http://127.0.0.1:9/unreachable".into(),
            ttl: Duration::from_secs(60),
        };
        let catalog = SubjectCatalog::new(reqwest::Client::new(), &config);
        catalog.prime(sample()).await;
        assert_eq!(catalog.electives().await.len(), 1);
        assert!(catalog.subject_by_id("93.26").await.is_some());

        catalog.invalidate().await;
        assert!(catalog.electives().await.is_empty());
    }
}
