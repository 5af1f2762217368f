use crate::identity::{self, IdentitySignals, VoteKind};
use crate::keys;
use crate::store::Kv;
use crate::utils::now_millis;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Aggregate like/dislike counters for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChange {
    Created,
    Changed,
    Removed,
}

/// What a vote request does, given the vote the identity already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    Create(VoteKind),
    Switch { from: VoteKind, to: VoteKind },
    Undo(VoteKind),
}

impl VoteTransition {
    pub fn plan(current: Option<VoteKind>, requested: VoteKind) -> Self {
        match current {
            Some(held) if held == requested => VoteTransition::Undo(held),
            Some(held) => VoteTransition::Switch {
                from: held,
                to: requested,
            },
            None => VoteTransition::Create(requested),
        }
    }

    pub fn change(&self) -> VoteChange {
        match self {
            VoteTransition::Create(_) => VoteChange::Created,
            VoteTransition::Switch { .. } => VoteChange::Changed,
            VoteTransition::Undo(_) => VoteChange::Removed,
        }
    }

    /// Vote held once the transition is applied.
    pub fn resulting_vote(&self) -> Option<VoteKind> {
        match self {
            VoteTransition::Create(kind) => Some(*kind),
            VoteTransition::Switch { to, .. } => Some(*to),
            VoteTransition::Undo(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub change: VoteChange,
    /// Vote now held by the identity. The caller mirrors this into the vote
    /// cookie, clearing it when `None`.
    pub current_vote: Option<VoteKind>,
    pub tally: VoteTally,
    pub message: String,
}

fn outcome_message(change: VoteChange, vote: VoteKind) -> String {
    match change {
        VoteChange::Created => "¡Gracias por tu voto!".to_string(),
        VoteChange::Removed => "Voto eliminado.".to_string(),
        VoteChange::Changed => {
            let label = match vote {
                VoteKind::Like => "Me gusta",
                VoteKind::Dislike => "No me gusta",
            };
            format!("Voto cambiado a '{label}'.")
        }
    }
}

fn counter_key(subject_id: &str, kind: VoteKind) -> String {
    match kind {
        VoteKind::Like => keys::subject_likes(subject_id),
        VoteKind::Dislike => keys::subject_dislikes(subject_id),
    }
}

/// Per-subject like/dislike counters plus the per-identity vote records.
#[derive(Clone)]
pub struct VoteLedger {
    kv: Kv,
}

impl VoteLedger {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub async fn tally(&self, subject_id: &str) -> Result<VoteTally> {
        let likes = self.kv.counter(&keys::subject_likes(subject_id)).await?;
        let dislikes = self.kv.counter(&keys::subject_dislikes(subject_id)).await?;
        Ok(VoteTally {
            likes: likes.max(0),
            dislikes: dislikes.max(0),
        })
    }

    pub async fn current_vote(
        &self,
        subject_id: &str,
        identity: &IdentitySignals,
    ) -> Result<Option<VoteKind>> {
        identity::current_vote(&self.kv, subject_id, identity).await
    }

    /// Applies a like/dislike request: a repeat of the held vote undoes it,
    /// the other kind switches, and no held vote creates one.
    pub async fn vote(
        &self,
        subject_id: &str,
        requested: VoteKind,
        identity: &IdentitySignals,
    ) -> Result<VoteOutcome> {
        let current = self.current_vote(subject_id, identity).await?;
        let transition = VoteTransition::plan(current, requested);

        match transition {
            VoteTransition::Create(kind) => {
                self.kv.increment(&counter_key(subject_id, kind)).await?;
            }
            VoteTransition::Switch { from, to } => {
                self.kv.increment(&counter_key(subject_id, to)).await?;
                self.kv
                    .decrement_floored(&counter_key(subject_id, from))
                    .await?;
            }
            VoteTransition::Undo(kind) => {
                self.kv
                    .decrement_floored(&counter_key(subject_id, kind))
                    .await?;
            }
        }

        let current_vote = transition.resulting_vote();
        self.record(subject_id, identity, current_vote).await?;
        let tally = self.tally(subject_id).await?;

        tracing::info!(
            subject_id = %subject_id,
            change = ?transition.change(),
            vote = %requested,
            likes = tally.likes,
            dislikes = tally.dislikes,
            "vote applied"
        );

        Ok(VoteOutcome {
            change: transition.change(),
            current_vote,
            tally,
            message: outcome_message(transition.change(), requested),
        })
    }

    /// Writes or clears the server-held vote records. The IP record is kept
    /// for analytics even though it never decides the current vote.
    async fn record(
        &self,
        subject_id: &str,
        identity: &IdentitySignals,
        vote: Option<VoteKind>,
    ) -> Result<()> {
        if let Some(ip) = identity.ip() {
            let key = keys::ip_vote(ip, subject_id);
            match vote {
                Some(kind) => {
                    self.kv.set(&key, &kind).await?;
                    self.kv.increment(&keys::ip_stats(ip)).await?;
                    self.kv.set(&keys::ip_last_seen(ip), &now_millis()).await?;
                }
                None => self.kv.clear(&key).await?,
            }
        }

        if let Some(fp) = identity.fingerprint() {
            let key = keys::fp_vote(fp, subject_id);
            match vote {
                Some(kind) => {
                    self.kv.set(&key, &kind).await?;
                    self.kv.increment(&keys::fp_stats(fp)).await?;
                    self.kv.set(&keys::fp_last_seen(fp), &now_millis()).await?;
                }
                None => self.kv.clear(&key).await?,
            }
        }

        Ok(())
    }

    /// Sets both aggregate counters back to zero. Identity records are left
    /// alone.
    pub async fn reset(&self, subject_id: &str) -> Result<()> {
        self.kv.set(&keys::subject_likes(subject_id), &0i64).await?;
        self.kv.set(&keys::subject_dislikes(subject_id), &0i64).await?;
        tracing::info!(subject_id = %subject_id, "votes reset");
        Ok(())
    }
}
