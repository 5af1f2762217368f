//! Who is asking: the weak signals a request carries and how they combine.
//!
//! A voter is known by up to three signals. The browser fingerprint is the
//! most durable, the vote cookie only lives as long as the browser session,
//! and the IP address is shared by whole campus networks. Only the
//! fingerprint and the cookie ever decide what a voter's current vote is; the
//! IP is recorded but never read back for that purpose.

use crate::keys;
use crate::store::Kv;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Like,
    Dislike,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Like => "like",
            VoteKind::Dislike => "dislike",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "like" => Ok(VoteKind::Like),
            "dislike" => Ok(VoteKind::Dislike),
            other => bail!("unknown vote kind: {other}"),
        }
    }
}

/// Identity signals attached to a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySignals {
    /// Vote recorded in the client-held cookie for the subject in question.
    pub cookie_vote: Option<VoteKind>,
    pub ip: Option<String>,
    /// Opaque output of the client's fingerprinting library.
    pub fingerprint: Option<String>,
}

impl IdentitySignals {
    /// Builds signals from raw values, dropping blank strings.
    pub fn new(ip: Option<String>, fingerprint: Option<String>) -> Self {
        Self {
            cookie_vote: None,
            ip: non_blank(ip),
            fingerprint: non_blank(fingerprint),
        }
    }

    pub fn with_cookie_vote(mut self, vote: Option<VoteKind>) -> Self {
        self.cookie_vote = vote;
        self
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// True when neither server-side signal is present.
    pub fn is_anonymous(&self) -> bool {
        self.ip.is_none() && self.fingerprint.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Fingerprint first, cookie second. An IP-recorded vote is deliberately not
/// an input.
pub fn resolve_current_vote(
    fingerprint_vote: Option<VoteKind>,
    cookie_vote: Option<VoteKind>,
) -> Option<VoteKind> {
    fingerprint_vote.or(cookie_vote)
}

/// Looks up the vote a request's identity currently holds on a subject.
pub async fn current_vote(
    kv: &Kv,
    subject_id: &str,
    identity: &IdentitySignals,
) -> Result<Option<VoteKind>> {
    let fingerprint_vote = match identity.fingerprint() {
        Some(fp) => kv.get::<VoteKind>(&keys::fp_vote(fp, subject_id)).await?,
        None => None,
    };
    Ok(resolve_current_vote(fingerprint_vote, identity.cookie_vote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_vote_wins_over_cookie() {
        assert_eq!(
            resolve_current_vote(Some(VoteKind::Dislike), Some(VoteKind::Like)),
            Some(VoteKind::Dislike)
        );
        assert_eq!(
            resolve_current_vote(None, Some(VoteKind::Like)),
            Some(VoteKind::Like)
        );
        assert_eq!(resolve_current_vote(None, None), None);
    }

    #[test]
    fn blank_signals_are_dropped() {
        let identity = IdentitySignals::new(Some("  ".into()), Some(" fp-1 ".into()));
        assert_eq!(identity.ip(), None);
        assert_eq!(identity.fingerprint(), Some("fp-1"));
        assert!(!identity.is_anonymous());
        assert!(IdentitySignals::new(None, Some(String::new())).is_anonymous());
    }

    #[test]
    fn vote_kind_parses_wire_names() {
        assert_eq!("like".parse::<VoteKind>().unwrap(), VoteKind::Like);
        assert_eq!("dislike".parse::<VoteKind>().unwrap(), VoteKind::Dislike);
        assert!("meh".parse::<VoteKind>().is_err());
        assert_eq!(serde_json::to_string(&VoteKind::Dislike).unwrap(), "\"dislike\"");
    }

    #[tokio::test]
    async fn ip_vote_is_never_consulted() {
        let kv = Kv::memory();
        kv.set(&keys::ip_vote("10.0.0.1", "81.57"), &VoteKind::Like)
            .await
            .unwrap();
        let identity = IdentitySignals::new(Some("10.0.0.1".into()), None);
        assert_eq!(current_vote(&kv, "81.57", &identity).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stored_fingerprint_vote_overrides_cookie() {
        let kv = Kv::memory();
        kv.set(&keys::fp_vote("fp-1", "81.57"), &VoteKind::Dislike)
            .await
            .unwrap();
        let identity = IdentitySignals::new(None, Some("fp-1".into()))
            .with_cookie_vote(Some(VoteKind::Like));
        assert_eq!(
            current_vote(&kv, "81.57", &identity).await.unwrap(),
            Some(VoteKind::Dislike)
        );
    }
}
