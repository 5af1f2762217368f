//! Entry points the web layer calls with already-extracted identity signals.
//!
//! Every mutating call checks the block list first. After that each
//! component runs its own state machine against the shared store; they never
//! call each other except where [`ReportModerator`] hides a comment through
//! the [`CommentStore`].

use crate::blocklist::BlockList;
use crate::comments::{Comment, CommentPolicy, CommentStore, LikeToggle};
use crate::config::ModerationConfig;
use crate::error::{ModerationError, ModerationResult};
use crate::identity::{IdentitySignals, VoteKind};
use crate::ratelimit::{CommentLimits, RateLimiter};
use crate::reports::{ReportModerator, ReportOutcome};
use crate::store::Kv;
use crate::votes::{VoteLedger, VoteOutcome, VoteTally};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectStanding {
    pub subject_id: String,
    pub tally: VoteTally,
    pub current_vote: Option<VoteKind>,
    pub visible_comments: i64,
}

#[derive(Clone)]
pub struct ReviewService {
    kv: Kv,
    blocklist: BlockList,
    votes: VoteLedger,
    limiter: RateLimiter,
    comments: CommentStore,
    reports: ReportModerator,
}

impl ReviewService {
    pub fn new(kv: Kv, config: &ModerationConfig) -> Self {
        let comments = CommentStore::new(kv.clone(), CommentPolicy::from(config));
        Self {
            blocklist: BlockList::new(kv.clone()),
            votes: VoteLedger::new(kv.clone()),
            limiter: RateLimiter::new(kv.clone(), CommentLimits::from(config)),
            reports: ReportModerator::new(kv.clone(), comments.clone(), config.report_threshold),
            comments,
            kv,
        }
    }

    pub fn store(&self) -> &Kv {
        &self.kv
    }

    pub fn blocklist(&self) -> &BlockList {
        &self.blocklist
    }

    pub fn votes(&self) -> &VoteLedger {
        &self.votes
    }

    pub fn comments(&self) -> &CommentStore {
        &self.comments
    }

    pub async fn vote(
        &self,
        subject_id: &str,
        vote: VoteKind,
        identity: &IdentitySignals,
    ) -> ModerationResult<VoteOutcome> {
        self.blocklist.ensure_allowed(identity).await?;
        Ok(self.votes.vote(subject_id, vote, identity).await?)
    }

    pub async fn add_comment(
        &self,
        subject_id: &str,
        text: &str,
        identity: &IdentitySignals,
    ) -> ModerationResult<Comment> {
        self.blocklist.ensure_allowed(identity).await?;
        self.comments.policy().validate(text)?;
        self.limiter.check(subject_id, identity).await?;
        let comment = self.comments.add(subject_id, text, identity).await?;
        self.limiter.record(subject_id, identity).await?;
        Ok(comment)
    }

    /// `liked` is the like marker the identity currently holds for the
    /// comment.
    pub async fn toggle_comment_like(
        &self,
        subject_id: &str,
        comment_id: &str,
        liked: bool,
        identity: &IdentitySignals,
    ) -> ModerationResult<LikeToggle> {
        self.blocklist.ensure_allowed(identity).await?;
        self.comments
            .toggle_like(subject_id, comment_id, liked)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("comment {comment_id}")))
    }

    pub async fn report_comment(
        &self,
        subject_id: &str,
        comment_id: &str,
        identity: &IdentitySignals,
    ) -> ModerationResult<ReportOutcome> {
        self.blocklist.ensure_allowed(identity).await?;
        self.reports.report(subject_id, comment_id, identity).await
    }

    /// Read-only view of a subject's counters for one identity.
    pub async fn standing(
        &self,
        subject_id: &str,
        identity: &IdentitySignals,
    ) -> Result<SubjectStanding> {
        Ok(SubjectStanding {
            subject_id: subject_id.to_string(),
            tally: self.votes.tally(subject_id).await?,
            current_vote: self.votes.current_vote(subject_id, identity).await?,
            visible_comments: self.comments.visible_count(subject_id).await?,
        })
    }
}
