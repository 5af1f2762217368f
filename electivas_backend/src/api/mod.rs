mod admin;
mod comments;
mod identity;
mod subjects;
mod votes;

use crate::analytics::AnalyticsService;
use crate::catalog::SubjectCatalog;
use crate::config::ElectivasConfig;
use crate::error::ModerationError;
use crate::service::ReviewService;
use crate::store::Kv;
use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: ElectivasConfig,
    pub service: ReviewService,
    pub analytics: AnalyticsService,
    pub catalog: SubjectCatalog,
}

impl AppState {
    pub fn new(config: ElectivasConfig, kv: Kv, http_client: reqwest::Client) -> Self {
        let service = ReviewService::new(kv, &config.moderation);
        let analytics = AnalyticsService::new(service.comments().clone());
        let catalog = SubjectCatalog::new(http_client, &config.catalog);
        Self {
            config,
            service,
            analytics,
            catalog,
        }
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse { message: msg }),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    message: "Unauthorized".into(),
                },
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorResponse { message: msg }),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse { message: msg }),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse { message: msg }),
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, ErrorResponse { message: msg })
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::Validation(msg) => ApiError::BadRequest(msg),
            ModerationError::RateLimited => ApiError::TooManyRequests(
                "Has alcanzado el límite de comentarios para esta materia.".into(),
            ),
            ModerationError::DuplicateReport => {
                ApiError::Conflict("Ya reportaste este comentario.".into())
            }
            ModerationError::Blocked => ApiError::Forbidden("Acceso bloqueado.".into()),
            ModerationError::Unidentified => {
                ApiError::BadRequest("No se pudo identificar la solicitud.".into())
            }
            ModerationError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            ModerationError::Store(err) => ApiError::Internal(err),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ip", get(identity::client_ip_handler))
        .route("/block-check", post(identity::block_check_handler))
        .route("/subjects", get(subjects::list_subjects))
        .route("/subjects/:id", get(subjects::get_subject))
        .route("/subjects/:id/votes", get(votes::get_votes))
        .route("/subjects/:id/vote", post(votes::cast_vote))
        .route(
            "/subjects/:id/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route(
            "/subjects/:id/comments/:comment_id/like",
            post(comments::toggle_like),
        )
        .route(
            "/subjects/:id/comments/:comment_id/report",
            post(comments::report_comment),
        )
        .route("/admin", post(admin::admin_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

const PORT_ATTEMPTS: usize = 100;

/// Binds the first free port at or above `start_port` on every interface.
async fn bind_listener(start_port: u16) -> Result<(TcpListener, SocketAddr)> {
    let mut last_error = None;
    for port in (start_port..=u16::MAX).take(PORT_ATTEMPTS) {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                let addr = listener
                    .local_addr()
                    .context("listener has no local address")?;
                return Ok((listener, addr));
            }
            Err(err) => {
                tracing::debug!(port, error = %err, "port unavailable");
                last_error = Some(err);
            }
        }
    }
    let cause = last_error.map_or_else(|| "empty range".to_string(), |err| err.to_string());
    anyhow::bail!("no free port within {PORT_ATTEMPTS} of {start_port}: {cause}")
}

pub async fn serve_http(config: ElectivasConfig, kv: Kv) -> Result<()> {
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("Electivas/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build shared HTTP client")?;

    let requested_port = config.api_port;
    let state = AppState::new(config, kv, http_client);
    let router = router(state);

    let (listener, addr) = bind_listener(requested_port).await?;
    if addr.port() != requested_port {
        tracing::warn!(
            requested_port,
            actual_port = addr.port(),
            "configured port was taken"
        );
    }

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
