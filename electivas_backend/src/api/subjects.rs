use super::comments::{public_comments, PublicComment};
use super::identity::request_identity;
use super::{ApiError, ApiResult, AppState};
use crate::catalog::Subject;
use crate::identity::VoteKind;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::net::SocketAddr;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectSummary {
    #[serde(flatten)]
    subject: Subject,
    likes: i64,
    dislikes: i64,
    comment_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectDetail {
    subject: Subject,
    likes: i64,
    dislikes: i64,
    current_vote: Option<VoteKind>,
    comments: Vec<PublicComment>,
}

/// Electives with their tallies and visible comment counts.
pub(crate) async fn list_subjects(State(state): State<AppState>) -> ApiResult<Vec<SubjectSummary>> {
    let subjects = state.catalog.electives().await;
    let mut summaries = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let tally = state.service.votes().tally(&subject.subject_id).await?;
        let comment_count = state
            .service
            .comments()
            .visible_count(&subject.subject_id)
            .await?;
        summaries.push(SubjectSummary {
            subject,
            likes: tally.likes,
            dislikes: tally.dislikes,
            comment_count,
        });
    }
    Ok(Json(summaries))
}

pub(crate) async fn get_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<SubjectDetail> {
    let subject = state
        .catalog
        .subject_by_id(&subject_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("subject {subject_id} not found")))?;

    let identity = request_identity(&headers, peer.ip(), Some(&subject_id));
    let standing = state.service.standing(&subject_id, &identity).await?;
    let comments = state.service.comments().list(&subject_id).await?;

    Ok(Json(SubjectDetail {
        subject,
        likes: standing.tally.likes,
        dislikes: standing.tally.dislikes,
        current_vote: standing.current_vote,
        comments: public_comments(comments, &headers),
    }))
}
