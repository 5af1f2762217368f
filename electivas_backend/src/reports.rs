use crate::comments::{CommentStore, HideResult};
use crate::error::{ModerationError, ModerationResult};
use crate::identity::IdentitySignals;
use crate::keys;
use crate::store::Kv;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub comment_id: String,
    /// Global report count for the comment after this report.
    pub reports: i64,
    /// True only for the report that moved the comment to hidden.
    pub hidden: bool,
}

/// Counts community reports and hides a comment once they reach the
/// threshold.
#[derive(Clone)]
pub struct ReportModerator {
    kv: Kv,
    comments: CommentStore,
    threshold: i64,
}

impl ReportModerator {
    pub fn new(kv: Kv, comments: CommentStore, threshold: i64) -> Self {
        Self {
            kv,
            comments,
            threshold,
        }
    }

    pub async fn report_count(&self, comment_id: &str) -> Result<i64> {
        self.kv.counter(&keys::comment_reports(comment_id)).await
    }

    /// Dedup is keyed on the fingerprint when there is one and on the IP
    /// otherwise.
    pub async fn already_reported(
        &self,
        comment_id: &str,
        identity: &IdentitySignals,
    ) -> Result<bool> {
        if let Some(fp) = identity.fingerprint() {
            return self.kv.flag(&keys::fp_report(fp, comment_id)).await;
        }
        if let Some(ip) = identity.ip() {
            return self.kv.flag(&keys::ip_report(ip, comment_id)).await;
        }
        Ok(false)
    }

    pub async fn report(
        &self,
        subject_id: &str,
        comment_id: &str,
        identity: &IdentitySignals,
    ) -> ModerationResult<ReportOutcome> {
        // Dedup needs at least one signal.
        if identity.is_anonymous() {
            return Err(ModerationError::Unidentified);
        }
        if self.comments.get(subject_id, comment_id).await?.is_none() {
            return Err(ModerationError::NotFound(format!("comment {comment_id}")));
        }
        if self.already_reported(comment_id, identity).await? {
            tracing::debug!(comment_id = %comment_id, "duplicate report rejected");
            return Err(ModerationError::DuplicateReport);
        }

        let reports = self.kv.increment(&keys::comment_reports(comment_id)).await?;
        if let Some(fp) = identity.fingerprint() {
            self.kv.set(&keys::fp_report(fp, comment_id), &true).await?;
        }
        if let Some(ip) = identity.ip() {
            self.kv.set(&keys::ip_report(ip, comment_id), &true).await?;
        }

        let hidden = if reports >= self.threshold {
            self.comments.hide(subject_id, comment_id).await? == HideResult::Hidden
        } else {
            false
        };

        if hidden {
            tracing::info!(
                subject_id = %subject_id,
                comment_id = %comment_id,
                reports,
                "comment hidden after reaching report threshold"
            );
        } else {
            tracing::debug!(comment_id = %comment_id, reports, "comment reported");
        }

        Ok(ReportOutcome {
            comment_id: comment_id.to_string(),
            reports,
            hidden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::CommentPolicy;

    async fn setup() -> (CommentStore, ReportModerator, String) {
        let kv = Kv::memory();
        let comments = CommentStore::new(kv.clone(), CommentPolicy::default());
        let comment = comments
            .add("81.57", "esto es un comentario", &IdentitySignals::default())
            .await
            .unwrap();
        let moderator = ReportModerator::new(kv, comments.clone(), 5);
        (comments, moderator, comment.id)
    }

    fn reporter(n: usize) -> IdentitySignals {
        IdentitySignals::new(Some(format!("10.0.0.{n}")), Some(format!("fp-{n}")))
    }

    #[tokio::test]
    async fn fifth_report_hides_and_later_ones_do_not_flip_back() {
        let (comments, moderator, id) = setup().await;

        for n in 1..=4 {
            let outcome = moderator.report("81.57", &id, &reporter(n)).await.unwrap();
            assert!(!outcome.hidden);
            assert_eq!(outcome.reports, n as i64);
        }
        assert_eq!(comments.visible_count("81.57").await.unwrap(), 1);

        let fifth = moderator.report("81.57", &id, &reporter(5)).await.unwrap();
        assert!(fifth.hidden);
        assert_eq!(comments.visible_count("81.57").await.unwrap(), 0);

        let sixth = moderator.report("81.57", &id, &reporter(6)).await.unwrap();
        assert!(!sixth.hidden);
        assert_eq!(sixth.reports, 6);
        assert!(comments.get("81.57", &id).await.unwrap().unwrap().is_hidden());
        assert_eq!(comments.visible_count("81.57").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_fingerprint_cannot_report_twice() {
        let (_, moderator, id) = setup().await;
        let identity = reporter(1);
        moderator.report("81.57", &id, &identity).await.unwrap();

        // A new IP does not help while the fingerprint is the same.
        let moved = IdentitySignals::new(Some("192.168.0.9".into()), Some("fp-1".into()));
        assert!(matches!(
            moderator.report("81.57", &id, &moved).await,
            Err(ModerationError::DuplicateReport)
        ));
        assert_eq!(moderator.report_count(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ip_dedup_applies_only_without_fingerprint() {
        let (_, moderator, id) = setup().await;
        let ip_only = IdentitySignals::new(Some("10.9.9.9".into()), None);
        moderator.report("81.57", &id, &ip_only).await.unwrap();
        assert!(matches!(
            moderator.report("81.57", &id, &ip_only).await,
            Err(ModerationError::DuplicateReport)
        ));

        // Someone else on that network with a fingerprint is still counted.
        let same_network = IdentitySignals::new(Some("10.9.9.9".into()), Some("fp-x".into()));
        let outcome = moderator.report("81.57", &id, &same_network).await.unwrap();
        assert_eq!(outcome.reports, 2);
    }

    #[tokio::test]
    async fn signal_less_report_is_refused_and_not_counted() {
        let (comments, moderator, id) = setup().await;
        for _ in 0..5 {
            assert!(matches!(
                moderator.report("81.57", &id, &IdentitySignals::default()).await,
                Err(ModerationError::Unidentified)
            ));
        }
        assert_eq!(moderator.report_count(&id).await.unwrap(), 0);
        assert_eq!(comments.visible_count("81.57").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_comment_is_not_counted() {
        let (_, moderator, _) = setup().await;
        assert!(matches!(
            moderator.report("81.57", "missing", &reporter(1)).await,
            Err(ModerationError::NotFound(_))
        ));
        assert_eq!(moderator.report_count("missing").await.unwrap(), 0);
    }
}
