use crate::config::ModerationConfig;
use crate::error::{ModerationError, ModerationResult};
use crate::identity::IdentitySignals;
use crate::keys;
use crate::store::Kv;
use anyhow::Result;

/// Per-subject comment caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentLimits {
    /// Cap for fingerprinted traffic, treated as one device.
    pub per_fingerprint: i64,
    /// Cap for IP-only traffic. Much looser since a campus NAT is many people.
    pub per_ip: i64,
}

impl Default for CommentLimits {
    fn default() -> Self {
        Self {
            per_fingerprint: 2,
            per_ip: 20,
        }
    }
}

impl From<&ModerationConfig> for CommentLimits {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            per_fingerprint: config.comments_per_subject_limit,
            per_ip: config.comments_per_subject_ip_limit,
        }
    }
}

/// Which counter gates a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentGate {
    Fingerprint,
    Ip,
    Unidentified,
}

impl CommentGate {
    pub fn for_identity(identity: &IdentitySignals) -> Self {
        if identity.fingerprint().is_some() {
            CommentGate::Fingerprint
        } else if identity.ip().is_some() {
            CommentGate::Ip
        } else {
            CommentGate::Unidentified
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    kv: Kv,
    limits: CommentLimits,
}

impl RateLimiter {
    pub fn new(kv: Kv, limits: CommentLimits) -> Self {
        Self { kv, limits }
    }

    pub async fn can_comment(&self, subject_id: &str, identity: &IdentitySignals) -> Result<bool> {
        let allowed = match CommentGate::for_identity(identity) {
            CommentGate::Fingerprint => {
                let fp = identity.fingerprint().unwrap_or_default();
                let count = self.kv.counter(&keys::fp_comment_count(fp, subject_id)).await?;
                count < self.limits.per_fingerprint
            }
            CommentGate::Ip => {
                let ip = identity.ip().unwrap_or_default();
                let count = self.kv.counter(&keys::ip_comment_count(ip, subject_id)).await?;
                count < self.limits.per_ip
            }
            CommentGate::Unidentified => false,
        };
        Ok(allowed)
    }

    /// Rejects with [`ModerationError::RateLimited`] once the gate's cap is
    /// reached, and with [`ModerationError::Unidentified`] when there is no
    /// counter to charge. Never writes.
    pub async fn check(&self, subject_id: &str, identity: &IdentitySignals) -> ModerationResult<()> {
        if CommentGate::for_identity(identity) == CommentGate::Unidentified {
            return Err(ModerationError::Unidentified);
        }
        if self.can_comment(subject_id, identity).await? {
            return Ok(());
        }
        tracing::debug!(
            subject_id = %subject_id,
            gate = ?CommentGate::for_identity(identity),
            "comment rejected by per-subject limit"
        );
        Err(ModerationError::RateLimited)
    }

    /// Counts an accepted comment against every signal present, whichever
    /// gate admitted it.
    pub async fn record(&self, subject_id: &str, identity: &IdentitySignals) -> Result<()> {
        if let Some(fp) = identity.fingerprint() {
            self.kv.increment(&keys::fp_comment_count(fp, subject_id)).await?;
        }
        if let Some(ip) = identity.ip() {
            self.kv.increment(&keys::ip_comment_count(ip, subject_id)).await?;
        }
        Ok(())
    }
}
