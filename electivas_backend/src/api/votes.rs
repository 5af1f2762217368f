use super::identity::{request_identity, set_cookie, vote_cookie_name};
use super::{ApiError, ApiResult, AppState};
use crate::identity::VoteKind;
use crate::votes::VoteChange;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub(crate) struct VoteRequest {
    vote: VoteKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VotesResponse {
    subject_id: String,
    likes: i64,
    dislikes: i64,
    current_vote: Option<VoteKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VoteResponse {
    success: bool,
    message: String,
    change: VoteChange,
    current_vote: Option<VoteKind>,
    likes: i64,
    dislikes: i64,
}

pub(crate) async fn get_votes(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<VotesResponse> {
    let identity = request_identity(&headers, peer.ip(), Some(&subject_id));
    let votes = state.service.votes();
    let tally = votes.tally(&subject_id).await?;
    let current_vote = votes.current_vote(&subject_id, &identity).await?;
    Ok(Json(VotesResponse {
        subject_id,
        likes: tally.likes,
        dislikes: tally.dislikes,
        current_vote,
    }))
}

/// Applies the vote and mirrors the resulting vote into the subject's vote
/// cookie.
pub(crate) async fn cast_vote(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<VoteRequest>,
) -> Result<Response, ApiError> {
    let identity = request_identity(&headers, peer.ip(), Some(&subject_id));
    let outcome = state
        .service
        .vote(&subject_id, payload.vote, &identity)
        .await?;

    let cookie = set_cookie(
        &vote_cookie_name(&subject_id),
        outcome.current_vote.map(|vote| vote.as_str()),
    );
    let body = VoteResponse {
        success: true,
        message: outcome.message,
        change: outcome.change,
        current_vote: outcome.current_vote,
        likes: outcome.tally.likes,
        dislikes: outcome.tally.dislikes,
    };
    Ok((AppendHeaders(cookie), Json(body)).into_response())
}
