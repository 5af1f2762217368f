use crate::error::{ModerationError, ModerationResult};
use crate::identity::IdentitySignals;
use crate::keys;
use crate::store::Kv;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single signal an admin can block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum BlockTarget {
    Ip(String),
    Fingerprint(String),
}

impl BlockTarget {
    fn key(&self) -> String {
        match self {
            BlockTarget::Ip(ip) => keys::blocked_ip(ip),
            BlockTarget::Fingerprint(fp) => keys::blocked_fp(fp),
        }
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTarget::Ip(ip) => write!(f, "IP {ip}"),
            BlockTarget::Fingerprint(fp) => write!(f, "Fingerprint {fp}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    pub ip_blocked: bool,
    pub fingerprint_blocked: bool,
}

impl BlockStatus {
    /// Either signal being blocked blocks the request.
    pub fn blocked(&self) -> bool {
        self.ip_blocked || self.fingerprint_blocked
    }
}

/// Persisted block flags for IPs and fingerprints.
#[derive(Clone)]
pub struct BlockList {
    kv: Kv,
}

impl BlockList {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub async fn block(&self, target: &BlockTarget) -> Result<()> {
        self.kv.set(&target.key(), &true).await?;
        tracing::info!(target = %target, "blocked");
        Ok(())
    }

    pub async fn unblock(&self, target: &BlockTarget) -> Result<()> {
        self.kv.clear(&target.key()).await?;
        tracing::info!(target = %target, "unblocked");
        Ok(())
    }

    pub async fn is_blocked(&self, target: &BlockTarget) -> Result<bool> {
        self.kv.flag(&target.key()).await
    }

    /// Block status of every signal present. Store errors propagate.
    pub async fn status(&self, identity: &IdentitySignals) -> Result<BlockStatus> {
        let ip_blocked = match identity.ip() {
            Some(ip) => self.is_blocked(&BlockTarget::Ip(ip.to_string())).await?,
            None => false,
        };
        let fingerprint_blocked = match identity.fingerprint() {
            Some(fp) => {
                self.is_blocked(&BlockTarget::Fingerprint(fp.to_string()))
                    .await?
            }
            None => false,
        };
        Ok(BlockStatus {
            ip_blocked,
            fingerprint_blocked,
        })
    }

    /// Like [`BlockList::status`], but a signal whose lookup fails counts as
    /// not blocked so a flaky store does not lock out legitimate users.
    pub async fn status_fail_open(&self, identity: &IdentitySignals) -> BlockStatus {
        let ip_blocked = match identity.ip() {
            Some(ip) => self
                .lookup_fail_open(BlockTarget::Ip(ip.to_string()))
                .await,
            None => false,
        };
        let fingerprint_blocked = match identity.fingerprint() {
            Some(fp) => {
                self.lookup_fail_open(BlockTarget::Fingerprint(fp.to_string()))
                    .await
            }
            None => false,
        };
        BlockStatus {
            ip_blocked,
            fingerprint_blocked,
        }
    }

    async fn lookup_fail_open(&self, target: BlockTarget) -> bool {
        match self.is_blocked(&target).await {
            Ok(blocked) => blocked,
            Err(err) => {
                tracing::warn!(error = ?err, target = %target, "block lookup failed, allowing");
                false
            }
        }
    }

    /// Gate for every mutating entry point.
    pub async fn ensure_allowed(&self, identity: &IdentitySignals) -> ModerationResult<()> {
        let status = self.status_fail_open(identity).await;
        if status.blocked() {
            tracing::warn!(
                ip_blocked = status.ip_blocked,
                fingerprint_blocked = status.fingerprint_blocked,
                "request from blocked identity rejected"
            );
            return Err(ModerationError::Blocked);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;
    use async_trait::async_trait;

    #[tokio::test]
    async fn block_and_unblock_round_trip() {
        let list = BlockList::new(Kv::memory());
        let target = BlockTarget::Ip("10.0.0.1".into());
        assert!(!list.is_blocked(&target).await.unwrap());
        list.block(&target).await.unwrap();
        assert!(list.is_blocked(&target).await.unwrap());
        list.unblock(&target).await.unwrap();
        assert!(!list.is_blocked(&target).await.unwrap());
    }

    #[tokio::test]
    async fn either_signal_blocks() {
        let list = BlockList::new(Kv::memory());
        list.block(&BlockTarget::Fingerprint("fp-bad".into()))
            .await
            .unwrap();

        let identity = IdentitySignals::new(Some("10.0.0.1".into()), Some("fp-bad".into()));
        let status = list.status(&identity).await.unwrap();
        assert!(!status.ip_blocked);
        assert!(status.fingerprint_blocked);
        assert!(matches!(
            list.ensure_allowed(&identity).await,
            Err(ModerationError::Blocked)
        ));

        let clean = IdentitySignals::new(Some("10.0.0.1".into()), Some("fp-good".into()));
        list.ensure_allowed(&clean).await.unwrap();
    }

    #[tokio::test]
    async fn explicit_null_means_unblocked() {
        let kv = Kv::memory();
        kv.set(&keys::blocked_ip("10.0.0.1"), &false).await.unwrap();
        let list = BlockList::new(kv);
        assert!(!list
            .is_blocked(&BlockTarget::Ip("10.0.0.1".into()))
            .await
            .unwrap());
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_raw(&self, _key: &str) -> Result<Option<String>> {
            anyhow::bail!("connection refused")
        }
        async fn set_raw(&self, _key: &str, _value: Option<String>) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn increment(&self, _key: &str) -> Result<i64> {
            anyhow::bail!("connection refused")
        }
        async fn decrement(&self, _key: &str) -> Result<i64> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn store_failures_fail_open_only_on_the_gate() {
        let list = BlockList::new(Kv::new(BrokenStore));
        let identity = IdentitySignals::new(Some("10.0.0.1".into()), Some("fp".into()));
        list.ensure_allowed(&identity).await.unwrap();
        assert!(list.status(&identity).await.is_err());
    }
}
