//! Operator commands that run against the configured store without starting
//! the HTTP server.

use crate::analytics::AnalyticsService;
use crate::api;
use crate::blocklist::BlockTarget;
use crate::config::ElectivasConfig;
use crate::identity::IdentitySignals;
use crate::service::ReviewService;
use crate::store::Kv;
use anyhow::{bail, Context, Result};

/// Run the HTTP server mode.
pub async fn run_server(config: ElectivasConfig, kv: Kv) -> Result<()> {
    tracing::info!(port = config.api_port, "starting electivas HTTP server");
    api::serve_http(config, kv).await
}

/// Picks the block target from the `--ip`/`--fingerprint` pair. Exactly one
/// must be given.
pub fn block_target(ip: Option<String>, fingerprint: Option<String>) -> Result<BlockTarget> {
    match (ip, fingerprint) {
        (Some(ip), None) => Ok(BlockTarget::Ip(ip)),
        (None, Some(fp)) => Ok(BlockTarget::Fingerprint(fp)),
        (Some(_), Some(_)) => bail!("pass either --ip or --fingerprint, not both"),
        (None, None) => bail!("one of --ip or --fingerprint is required"),
    }
}

pub struct Operator {
    service: ReviewService,
    analytics: AnalyticsService,
}

impl Operator {
    pub fn new(config: &ElectivasConfig, kv: Kv) -> Self {
        let service = ReviewService::new(kv, &config.moderation);
        let analytics = AnalyticsService::new(service.comments().clone());
        Self { service, analytics }
    }

    pub async fn block(&self, target: &BlockTarget) -> Result<String> {
        self.service.blocklist().block(target).await?;
        Ok(format!("{target} blocked"))
    }

    pub async fn unblock(&self, target: &BlockTarget) -> Result<String> {
        self.service.blocklist().unblock(target).await?;
        Ok(format!("{target} unblocked"))
    }

    pub async fn status(&self, ip: Option<String>, fingerprint: Option<String>) -> Result<String> {
        let identity = IdentitySignals::new(ip, fingerprint);
        if identity.is_anonymous() {
            bail!("one of --ip or --fingerprint is required");
        }
        let status = self.service.blocklist().status(&identity).await?;
        to_pretty(&status)
    }

    pub async fn analytics(&self, subject_id: &str) -> Result<String> {
        let analytics = self.analytics.comment_analytics(subject_id).await?;
        to_pretty(&analytics)
    }

    pub async fn reset_votes(&self, subject_id: &str) -> Result<String> {
        self.service.votes().reset(subject_id).await?;
        Ok(format!("votes for {subject_id} reset"))
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to render output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ElectivasPaths, StoreBackend};
    use crate::identity::VoteKind;

    fn operator() -> (Operator, ReviewService) {
        let config = ElectivasConfig::new(0, ElectivasPaths::default(), StoreBackend::Memory);
        let kv = Kv::memory();
        let service = ReviewService::new(kv.clone(), &config.moderation);
        (Operator::new(&config, kv), service)
    }

    #[test]
    fn exactly_one_target_flag() {
        assert_eq!(
            block_target(Some("10.0.0.1".into()), None).unwrap(),
            BlockTarget::Ip("10.0.0.1".into())
        );
        assert!(block_target(None, None).is_err());
        assert!(block_target(Some("a".into()), Some("b".into())).is_err());
    }

    #[tokio::test]
    async fn block_then_status_reports_it() {
        let (operator, _) = operator();
        let target = block_target(None, Some("fp-bad".into())).unwrap();
        assert_eq!(operator.block(&target).await.unwrap(), "Fingerprint fp-bad blocked");

        let status = operator.status(None, Some("fp-bad".into())).await.unwrap();
        assert!(status.contains("\"fingerprintBlocked\": true"));

        operator.unblock(&target).await.unwrap();
        let status = operator.status(None, Some("fp-bad".into())).await.unwrap();
        assert!(status.contains("\"fingerprintBlocked\": false"));
    }

    #[tokio::test]
    async fn reset_votes_zeroes_the_tally() {
        let (operator, service) = operator();
        let voter = IdentitySignals::new(None, Some("fp-1".into()));
        service.vote("81.57", VoteKind::Like, &voter).await.unwrap();

        operator.reset_votes("81.57").await.unwrap();
        let tally = service.votes().tally("81.57").await.unwrap();
        assert_eq!((tally.likes, tally.dislikes), (0, 0));
    }
}
