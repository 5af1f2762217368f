//! Admin-only views over tracked comments.

use crate::comments::{Comment, CommentStore};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One IP behind more than this many fingerprints looks like device spoofing.
pub const MAX_FINGERPRINTS_PER_IP: usize = 3;
/// One fingerprint seen from more than this many IPs hops networks a lot.
pub const MAX_IPS_PER_FINGERPRINT: usize = 2;
/// More comments than this from a single IP on one subject.
pub const HIGH_VOLUME_COMMENTS_PER_IP: usize = 10;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousPatterns {
    pub same_ip_multiple_fingerprints: Vec<String>,
    pub same_fingerprint_multiple_ips: Vec<String>,
    pub high_volume_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAnalytics {
    pub total_comments: usize,
    pub unique_ips: usize,
    pub unique_fingerprints: usize,
    pub suspicious_patterns: SuspiciousPatterns,
}

impl CommentAnalytics {
    pub fn from_comments(comments: &[Comment]) -> Self {
        let mut ips = BTreeSet::new();
        let mut fingerprints = BTreeSet::new();
        let mut ip_to_fingerprints: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut fingerprint_to_ips: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut ip_comment_counts: BTreeMap<&str, usize> = BTreeMap::new();

        for comment in comments {
            let ip = comment.ip.as_deref();
            let fingerprint = comment.fingerprint.as_deref();

            if let Some(ip) = ip {
                ips.insert(ip);
                *ip_comment_counts.entry(ip).or_default() += 1;
            }
            if let Some(fp) = fingerprint {
                fingerprints.insert(fp);
            }
            if let (Some(ip), Some(fp)) = (ip, fingerprint) {
                ip_to_fingerprints.entry(ip).or_default().insert(fp);
                fingerprint_to_ips.entry(fp).or_default().insert(ip);
            }
        }

        let suspicious_patterns = SuspiciousPatterns {
            same_ip_multiple_fingerprints: ip_to_fingerprints
                .iter()
                .filter(|(_, fps)| fps.len() > MAX_FINGERPRINTS_PER_IP)
                .map(|(ip, _)| ip.to_string())
                .collect(),
            same_fingerprint_multiple_ips: fingerprint_to_ips
                .iter()
                .filter(|(_, ips)| ips.len() > MAX_IPS_PER_FINGERPRINT)
                .map(|(fp, _)| fp.to_string())
                .collect(),
            high_volume_ips: ip_comment_counts
                .iter()
                .filter(|(_, count)| **count > HIGH_VOLUME_COMMENTS_PER_IP)
                .map(|(ip, _)| ip.to_string())
                .collect(),
        };

        Self {
            total_comments: comments.len(),
            unique_ips: ips.len(),
            unique_fingerprints: fingerprints.len(),
            suspicious_patterns,
        }
    }
}

/// Truncated comment row for the admin listing, with tracking data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCommentView {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
    pub likes: i64,
    pub hidden: bool,
    pub ip: String,
    pub fingerprint: String,
    pub date: String,
}

impl AdminCommentView {
    pub fn from_comment(comment: &Comment) -> Self {
        Self {
            id: comment.id.clone(),
            text: preview(&comment.text),
            timestamp: comment.timestamp,
            likes: comment.likes,
            hidden: comment.is_hidden(),
            ip: comment.ip.clone().unwrap_or_else(|| "N/A".into()),
            fingerprint: comment.fingerprint.clone().unwrap_or_else(|| "N/A".into()),
            date: Utc
                .timestamp_millis_opt(comment.timestamp)
                .single()
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(PREVIEW_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[derive(Clone)]
pub struct AnalyticsService {
    comments: CommentStore,
}

impl AnalyticsService {
    pub fn new(comments: CommentStore) -> Self {
        Self { comments }
    }

    pub async fn comment_analytics(&self, subject_id: &str) -> Result<CommentAnalytics> {
        let comments = self.comments.list(subject_id).await?;
        Ok(CommentAnalytics::from_comments(&comments))
    }

    pub async fn admin_comments(&self, subject_id: &str) -> Result<Vec<AdminCommentView>> {
        let comments = self.comments.list(subject_id).await?;
        Ok(comments.iter().map(AdminCommentView::from_comment).collect())
    }
}
