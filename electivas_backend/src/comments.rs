//! Per-subject comment lists.
//!
//! Each subject's comments live as one JSON array under a single key and are
//! updated by read-modify-write. Two writers racing on the same subject can
//! lose one update; counters kept beside the list use atomic increments and
//! are not affected. All list access stays inside [`CommentStore`] so the
//! layout can change without touching callers.

use crate::config::ModerationConfig;
use crate::error::{ModerationError, ModerationResult};
use crate::identity::IdentitySignals;
use crate::keys;
use crate::store::Kv;
use crate::utils::now_millis;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Moderation state of a comment. Moves from `Visible` to `Hidden` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_hidden(&self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}

/// Stored as the boolean `hidden` field for compatibility with existing data.
mod hidden_flag {
    use super::Visibility;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Visibility, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(value.is_hidden())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Visibility, D::Error> {
        let hidden = Option::<bool>::deserialize(deserializer)?.unwrap_or(false);
        Ok(if hidden {
            Visibility::Hidden
        } else {
            Visibility::Visible
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub subject_id: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub likes: i64,
    #[serde(rename = "hidden", default, with = "hidden_flag")]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Comment {
    pub fn is_hidden(&self) -> bool {
        self.visibility.is_hidden()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub track_identity: bool,
}

impl Default for CommentPolicy {
    fn default() -> Self {
        Self::from(&ModerationConfig::default())
    }
}

impl From<&ModerationConfig> for CommentPolicy {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            min_length: config.comment_min_length,
            max_length: config.comment_max_length,
            track_identity: config.track_comment_identity,
        }
    }
}

impl CommentPolicy {
    /// Trims `text` and checks its length in characters.
    pub fn validate(&self, text: &str) -> ModerationResult<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ModerationError::Validation(
                "El comentario no puede estar vacío.".into(),
            ));
        }
        let length = trimmed.chars().count();
        if length < self.min_length {
            return Err(ModerationError::Validation(format!(
                "El comentario debe tener al menos {} caracteres.",
                self.min_length
            )));
        }
        if length > self.max_length {
            return Err(ModerationError::Validation(format!(
                "El comentario no puede superar los {} caracteres.",
                self.max_length
            )));
        }
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeToggle {
    pub comment_id: String,
    pub likes: i64,
    /// Marker state after the toggle; the caller mirrors it into the like
    /// cookie.
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideResult {
    Hidden,
    AlreadyHidden,
    Missing,
}

#[derive(Clone)]
pub struct CommentStore {
    kv: Kv,
    policy: CommentPolicy,
}

impl CommentStore {
    pub fn new(kv: Kv, policy: CommentPolicy) -> Self {
        Self { kv, policy }
    }

    pub fn policy(&self) -> &CommentPolicy {
        &self.policy
    }

    pub async fn list(&self, subject_id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .kv
            .get::<Vec<Comment>>(&keys::subject_comments(subject_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn get(&self, subject_id: &str, comment_id: &str) -> Result<Option<Comment>> {
        let comments = self.list(subject_id).await?;
        Ok(comments.into_iter().find(|comment| comment.id == comment_id))
    }

    pub async fn visible_count(&self, subject_id: &str) -> Result<i64> {
        let count = self
            .kv
            .counter(&keys::subject_visible_comment_count(subject_id))
            .await?;
        Ok(count.max(0))
    }

    async fn save(&self, subject_id: &str, comments: &[Comment]) -> Result<()> {
        self.kv
            .set(&keys::subject_comments(subject_id), comments)
            .await
    }

    /// Validates and appends a new comment. Rate limiting is the caller's
    /// concern.
    pub async fn add(
        &self,
        subject_id: &str,
        text: &str,
        identity: &IdentitySignals,
    ) -> ModerationResult<Comment> {
        let text = self.policy.validate(text)?;
        let (ip, fingerprint) = if self.policy.track_identity {
            (identity.ip.clone(), identity.fingerprint.clone())
        } else {
            (None, None)
        };
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            text,
            timestamp: now_millis(),
            likes: 0,
            visibility: Visibility::Visible,
            ip,
            fingerprint,
        };

        let mut comments = self.list(subject_id).await?;
        comments.push(comment.clone());
        self.save(subject_id, &comments).await?;
        self.kv
            .increment(&keys::subject_visible_comment_count(subject_id))
            .await?;

        tracing::info!(
            subject_id = %subject_id,
            comment_id = %comment.id,
            "comment added"
        );
        Ok(comment)
    }

    /// Flips a like. `liked` is the marker the identity currently holds.
    /// Returns `None` when the comment does not exist.
    pub async fn toggle_like(
        &self,
        subject_id: &str,
        comment_id: &str,
        liked: bool,
    ) -> Result<Option<LikeToggle>> {
        let mut comments = self.list(subject_id).await?;
        let Some(comment) = comments.iter_mut().find(|c| c.id == comment_id) else {
            return Ok(None);
        };

        if liked {
            comment.likes = (comment.likes - 1).max(0);
        } else {
            comment.likes += 1;
        }
        let toggle = LikeToggle {
            comment_id: comment.id.clone(),
            likes: comment.likes,
            liked: !liked,
        };

        self.save(subject_id, &comments).await?;
        Ok(Some(toggle))
    }

    /// Marks a comment hidden and drops it from the visible count. Calling it
    /// again is a no-op.
    pub async fn hide(&self, subject_id: &str, comment_id: &str) -> Result<HideResult> {
        let mut comments = self.list(subject_id).await?;
        let Some(comment) = comments.iter_mut().find(|c| c.id == comment_id) else {
            return Ok(HideResult::Missing);
        };
        if comment.is_hidden() {
            return Ok(HideResult::AlreadyHidden);
        }
        comment.visibility = Visibility::Hidden;
        self.save(subject_id, &comments).await?;
        self.kv
            .decrement_floored(&keys::subject_visible_comment_count(subject_id))
            .await?;
        Ok(HideResult::Hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CommentStore {
        CommentStore::new(Kv::memory(), CommentPolicy::default())
    }

    fn text_of(len: usize) -> String {
        "a".repeat(len)
    }

    #[tokio::test]
    async fn length_bounds_are_inclusive() {
        let store = store();
        let identity = IdentitySignals::default();
        assert!(matches!(
            store.add("81.57", &text_of(9), &identity).await,
            Err(ModerationError::Validation(_))
        ));
        store.add("81.57", &text_of(10), &identity).await.unwrap();
        store.add("81.57", &text_of(3000), &identity).await.unwrap();
        assert!(matches!(
            store.add("81.57", &text_of(3001), &identity).await,
            Err(ModerationError::Validation(_))
        ));
        assert_eq!(store.list("81.57").await.unwrap().len(), 2);
        assert_eq!(store.visible_count("81.57").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn whitespace_does_not_count_toward_length() {
        let store = store();
        let padded = format!("   {}   ", text_of(9));
        assert!(store
            .add("81.57", &padded, &IdentitySignals::default())
            .await
            .is_err());
        assert!(store
            .add("81.57", "   ", &IdentitySignals::default())
            .await
            .is_err());
        assert!(store.list("81.57").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn length_counts_characters_not_bytes() {
        let policy = CommentPolicy::default();
        assert!(policy.validate("ñandú ñandú").is_ok());
        assert!(policy.validate("ñññññññññ").is_err());
    }

    #[tokio::test]
    async fn new_comment_shape() {
        let store = store();
        let identity = IdentitySignals::new(Some("10.0.0.1".into()), Some("fp-1".into()));
        let comment = store
            .add("81.57", "  muy buena materia  ", &identity)
            .await
            .unwrap();
        assert_eq!(comment.text, "muy buena materia");
        assert_eq!(comment.likes, 0);
        assert!(!comment.is_hidden());
        assert_eq!(comment.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(comment.fingerprint.as_deref(), Some("fp-1"));

        let other = store.add("81.57", "otra opinión más", &identity).await.unwrap();
        assert_ne!(comment.id, other.id);
        let listed = store.list("81.57").await.unwrap();
        assert_eq!(listed[0].id, comment.id);
        assert_eq!(listed[1].id, other.id);
    }

    #[tokio::test]
    async fn identity_is_not_kept_when_tracking_is_off() {
        let policy = CommentPolicy {
            track_identity: false,
            ..CommentPolicy::default()
        };
        let store = CommentStore::new(Kv::memory(), policy);
        let identity = IdentitySignals::new(Some("10.0.0.1".into()), Some("fp-1".into()));
        let comment = store.add("81.57", "sin rastreo acá", &identity).await.unwrap();
        assert_eq!(comment.ip, None);
        assert_eq!(comment.fingerprint, None);
    }

    #[tokio::test]
    async fn like_toggles_and_never_goes_negative() {
        let store = store();
        let comment = store
            .add("81.57", "comentario de prueba", &IdentitySignals::default())
            .await
            .unwrap();

        let first = store.toggle_like("81.57", &comment.id, false).await.unwrap().unwrap();
        assert_eq!(first.likes, 1);
        assert!(first.liked);

        let second = store
            .toggle_like("81.57", &comment.id, first.liked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.likes, 0);
        assert!(!second.liked);

        // A stale marker cannot push the count below zero.
        let third = store.toggle_like("81.57", &comment.id, true).await.unwrap().unwrap();
        assert_eq!(third.likes, 0);
    }

    #[tokio::test]
    async fn liking_a_missing_comment_is_none() {
        let store = store();
        assert_eq!(store.toggle_like("81.57", "nope", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn hide_is_one_way_and_counted_once() {
        let store = store();
        let comment = store
            .add("81.57", "comentario ofensivo", &IdentitySignals::default())
            .await
            .unwrap();
        assert_eq!(store.hide("81.57", &comment.id).await.unwrap(), HideResult::Hidden);
        assert_eq!(
            store.hide("81.57", &comment.id).await.unwrap(),
            HideResult::AlreadyHidden
        );
        assert_eq!(store.hide("81.57", "nope").await.unwrap(), HideResult::Missing);
        assert_eq!(store.visible_count("81.57").await.unwrap(), 0);
        assert!(store.get("81.57", &comment.id).await.unwrap().unwrap().is_hidden());
    }

    #[test]
    fn reads_comments_written_without_hidden_or_tracking_fields() {
        let raw = r#"[{"id":"c1","subjectId":"81.57","text":"hola hola hola","timestamp":1720000000000,"likes":3}]"#;
        let comments: Vec<Comment> = serde_json::from_str(raw).unwrap();
        assert_eq!(comments[0].visibility, Visibility::Visible);
        assert_eq!(comments[0].likes, 3);

        let hidden = r#"{"id":"c2","subjectId":"81.57","text":"x","timestamp":1,"likes":0,"hidden":true,"ip":"1.1.1.1"}"#;
        let comment: Comment = serde_json::from_str(hidden).unwrap();
        assert!(comment.is_hidden());
        let encoded = serde_json::to_value(&comment).unwrap();
        assert_eq!(encoded["hidden"], serde_json::Value::Bool(true));
        assert_eq!(encoded["subjectId"], "81.57");
        assert!(encoded.get("fingerprint").is_none());
    }
}
