//! Single admin endpoint dispatching on an `action` field, guarded by a shared
//! secret in the `x-admin-secret` header.

use super::{ApiError, AppState};
use crate::analytics::{AdminCommentView, CommentAnalytics};
use crate::blocklist::{BlockStatus, BlockTarget};
use crate::identity::IdentitySignals;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminRequest {
    action: String,
    ip: Option<String>,
    fingerprint: Option<String>,
    subject_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AdminCommand {
    Block(BlockTarget),
    Unblock(BlockTarget),
    CheckStatus {
        ip: Option<String>,
        fingerprint: Option<String>,
    },
    Analytics(String),
    Comments(String),
    ResetVotes(String),
}

fn required(value: Option<String>, what: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{what} required")))
}

impl TryFrom<AdminRequest> for AdminCommand {
    type Error = ApiError;

    fn try_from(request: AdminRequest) -> Result<Self, Self::Error> {
        let AdminRequest {
            action,
            ip,
            fingerprint,
            subject_id,
        } = request;
        let command = match action.as_str() {
            "block_ip" => AdminCommand::Block(BlockTarget::Ip(required(ip, "IP")?)),
            "block_fingerprint" => {
                AdminCommand::Block(BlockTarget::Fingerprint(required(fingerprint, "Fingerprint")?))
            }
            "unblock_ip" => AdminCommand::Unblock(BlockTarget::Ip(required(ip, "IP")?)),
            "unblock_fingerprint" => AdminCommand::Unblock(BlockTarget::Fingerprint(required(
                fingerprint,
                "Fingerprint",
            )?)),
            "check_status" => AdminCommand::CheckStatus { ip, fingerprint },
            "get_analytics" => AdminCommand::Analytics(required(subject_id, "Subject ID")?),
            "get_comments" => AdminCommand::Comments(required(subject_id, "Subject ID")?),
            "reset_votes" => AdminCommand::ResetVotes(required(subject_id, "Subject ID")?),
            _ => return Err(ApiError::BadRequest("Invalid action".into())),
        };
        Ok(command)
    }
}

/// An unset secret rejects every request.
fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), ApiError> {
    let provided = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    match (provided, secret) {
        (Some(provided), Some(secret)) if provided == secret => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    ip: Option<String>,
    fingerprint: Option<String>,
    #[serde(flatten)]
    status: BlockStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentsResponse {
    subject_id: String,
    total_comments: usize,
    comments: Vec<AdminCommentView>,
}

pub(crate) async fn admin_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AdminRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    authorize(&headers, state.config.admin.secret.as_deref())?;
    let Json(request) = payload.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let command = AdminCommand::try_from(request)?;
    tracing::info!(command = ?command, "admin action");

    let response = match command {
        AdminCommand::Block(target) => {
            state.service.blocklist().block(&target).await?;
            action_response(format!("{target} blocked"))
        }
        AdminCommand::Unblock(target) => {
            state.service.blocklist().unblock(&target).await?;
            action_response(format!("{target} unblocked"))
        }
        AdminCommand::CheckStatus { ip, fingerprint } => {
            let identity = IdentitySignals::new(ip.clone(), fingerprint.clone());
            let status = state.service.blocklist().status(&identity).await?;
            Json(StatusResponse {
                ip,
                fingerprint,
                status,
            })
            .into_response()
        }
        AdminCommand::Analytics(subject_id) => {
            let analytics: CommentAnalytics =
                state.analytics.comment_analytics(&subject_id).await?;
            Json(analytics).into_response()
        }
        AdminCommand::Comments(subject_id) => {
            let comments = state.analytics.admin_comments(&subject_id).await?;
            Json(CommentsResponse {
                subject_id,
                total_comments: comments.len(),
                comments,
            })
            .into_response()
        }
        AdminCommand::ResetVotes(subject_id) => {
            state.service.votes().reset(&subject_id).await?;
            action_response("Votos reiniciados.".to_string())
        }
    };
    Ok(response)
}

fn action_response(message: String) -> Response {
    Json(ActionResponse {
        success: true,
        message,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(action: &str) -> AdminRequest {
        AdminRequest {
            action: action.into(),
            ip: None,
            fingerprint: None,
            subject_id: None,
        }
    }

    #[test]
    fn secret_must_match_and_be_configured() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            authorize(&headers, Some("s3cret")),
            Err(ApiError::Unauthorized)
        ));

        headers.insert(ADMIN_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(authorize(&headers, Some("s3cret")).is_ok());
        assert!(authorize(&headers, Some("other")).is_err());
        assert!(authorize(&headers, None).is_err());
    }

    #[test]
    fn actions_require_their_arguments() {
        assert!(matches!(
            AdminCommand::try_from(request("block_ip")),
            Err(ApiError::BadRequest(msg)) if msg == "IP required"
        ));
        assert!(matches!(
            AdminCommand::try_from(request("get_comments")),
            Err(ApiError::BadRequest(msg)) if msg == "Subject ID required"
        ));
        assert!(matches!(
            AdminCommand::try_from(request("drop_tables")),
            Err(ApiError::BadRequest(msg)) if msg == "Invalid action"
        ));

        let mut block = request("block_fingerprint");
        block.fingerprint = Some("fp-bad".into());
        assert_eq!(
            AdminCommand::try_from(block).unwrap(),
            AdminCommand::Block(BlockTarget::Fingerprint("fp-bad".into()))
        );

        assert_eq!(
            AdminCommand::try_from(request("check_status")).unwrap(),
            AdminCommand::CheckStatus {
                ip: None,
                fingerprint: None
            }
        );
    }
}
