//! Key layout of the shared store.
//!
//! These names are compatible with existing store dumps; do not rename them.

pub fn subject_likes(subject_id: &str) -> String {
    format!("subject:{subject_id}:likes")
}

pub fn subject_dislikes(subject_id: &str) -> String {
    format!("subject:{subject_id}:dislikes")
}

pub fn subject_comments(subject_id: &str) -> String {
    format!("subject:{subject_id}:comments")
}

pub fn subject_visible_comment_count(subject_id: &str) -> String {
    format!("subject:{subject_id}:visibleCommentCount")
}

pub fn ip_vote(ip: &str, subject_id: &str) -> String {
    format!("ip-vote:{ip}:{subject_id}")
}

pub fn fp_vote(fingerprint: &str, subject_id: &str) -> String {
    format!("fp-vote:{fingerprint}:{subject_id}")
}

pub fn ip_comment_count(ip: &str, subject_id: &str) -> String {
    format!("ip-comment-count:{ip}:{subject_id}")
}

pub fn fp_comment_count(fingerprint: &str, subject_id: &str) -> String {
    format!("fp-comment-count:{fingerprint}:{subject_id}")
}

pub fn comment_reports(comment_id: &str) -> String {
    format!("comment:{comment_id}:reports")
}

pub fn ip_report(ip: &str, comment_id: &str) -> String {
    format!("ip-report:{ip}:{comment_id}")
}

pub fn fp_report(fingerprint: &str, comment_id: &str) -> String {
    format!("fp-report:{fingerprint}:{comment_id}")
}

pub fn blocked_ip(ip: &str) -> String {
    format!("blocked-ip:{ip}")
}

pub fn blocked_fp(fingerprint: &str) -> String {
    format!("blocked-fp:{fingerprint}")
}

pub fn ip_stats(ip: &str) -> String {
    format!("ip-stats:{ip}:count")
}

pub fn ip_last_seen(ip: &str) -> String {
    format!("ip-last-seen:{ip}")
}

pub fn fp_stats(fingerprint: &str) -> String {
    format!("fp-stats:{fingerprint}:count")
}

pub fn fp_last_seen(fingerprint: &str) -> String {
    format!("fp-last-seen:{fingerprint}")
}
