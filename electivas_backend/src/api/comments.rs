use super::identity::{cookie, like_cookie_name, request_identity, set_cookie};
use super::{ApiError, ApiResult, AppState};
use crate::comments::Comment;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

const LIKED_MARKER: &str = "true";

/// Comment as shown to visitors: tracking fields stripped, like marker
/// resolved from the request's cookies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicComment {
    id: String,
    subject_id: String,
    text: String,
    timestamp: i64,
    likes: i64,
    hidden: bool,
    liked: bool,
}

impl PublicComment {
    fn from_comment(comment: Comment, headers: &HeaderMap) -> Self {
        let liked = cookie(headers, &like_cookie_name(&comment.id)).is_some();
        Self {
            hidden: comment.is_hidden(),
            id: comment.id,
            subject_id: comment.subject_id,
            text: comment.text,
            timestamp: comment.timestamp,
            likes: comment.likes,
            liked,
        }
    }
}

/// Newest first. Hidden comments stay in the list, flagged.
pub(crate) fn public_comments(mut comments: Vec<Comment>, headers: &HeaderMap) -> Vec<PublicComment> {
    comments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    comments
        .into_iter()
        .map(|comment| PublicComment::from_comment(comment, headers))
        .collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddCommentRequest {
    text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddCommentResponse {
    success: bool,
    message: &'static str,
    comment: PublicComment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LikeResponse {
    success: bool,
    message: &'static str,
    comment_id: String,
    likes: i64,
    liked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportResponse {
    success: bool,
    comment_id: String,
    reports: i64,
    hidden: bool,
}

pub(crate) async fn list_comments(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Vec<PublicComment>> {
    let comments = state.service.comments().list(&subject_id).await?;
    Ok(Json(public_comments(comments, &headers)))
}

pub(crate) async fn add_comment(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<AddCommentResponse>), ApiError> {
    let identity = request_identity(&headers, peer.ip(), None);
    let comment = state
        .service
        .add_comment(&subject_id, &payload.text, &identity)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AddCommentResponse {
            success: true,
            message: "Comentario añadido.",
            comment: PublicComment::from_comment(comment, &headers),
        }),
    ))
}

/// Like or unlike depending on the request's like cookie for the comment.
pub(crate) async fn toggle_like(
    State(state): State<AppState>,
    Path((subject_id, comment_id)): Path<(String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cookie_name = like_cookie_name(&comment_id);
    let liked = cookie(&headers, &cookie_name).is_some();
    let identity = request_identity(&headers, peer.ip(), None);
    let toggle = state
        .service
        .toggle_comment_like(&subject_id, &comment_id, liked, &identity)
        .await?;

    let message = if toggle.liked {
        "¡Gracias por tu voto!"
    } else {
        "Voto eliminado."
    };
    let cookie = set_cookie(&cookie_name, toggle.liked.then_some(LIKED_MARKER));
    let body = LikeResponse {
        success: true,
        message,
        comment_id: toggle.comment_id,
        likes: toggle.likes,
        liked: toggle.liked,
    };
    Ok((AppendHeaders(cookie), Json(body)).into_response())
}

pub(crate) async fn report_comment(
    State(state): State<AppState>,
    Path((subject_id, comment_id)): Path<(String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<ReportResponse> {
    let identity = request_identity(&headers, peer.ip(), None);
    let outcome = state
        .service
        .report_comment(&subject_id, &comment_id, &identity)
        .await?;
    Ok(Json(ReportResponse {
        success: true,
        comment_id: outcome.comment_id,
        reports: outcome.reports,
        hidden: outcome.hidden,
    }))
}
