use thiserror::Error;

/// Failures surfaced by the voting, comment and moderation entry points.
///
/// Every variant except `Store` is a rejection decided before any state was
/// written.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("{0}")]
    Validation(String),

    #[error("comment limit reached for this subject")]
    RateLimited,

    #[error("comment already reported")]
    DuplicateReport,

    #[error("identity is blocked")]
    Blocked,

    #[error("request carries neither an IP nor a fingerprint")]
    Unidentified,

    #[error("{0} not found")]
    NotFound(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type ModerationResult<T> = Result<T, ModerationError>;
