//! HTTP error taxonomy (§7): kind → status code, structured JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited { retry_after_secs: u64, scope: String },
    #[error(transparent)]
    Webhooks(#[from] tmi_webhooks::Error),
    #[error(transparent)]
    RateLimit(#[from] tmi_ratelimit::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    error_description: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, description) = match &self {
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            Self::RateLimited { retry_after_secs: _, scope } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited", format!("rate limit exceeded for scope {scope}"))
            }
            Self::Webhooks(tmi_webhooks::Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            Self::Webhooks(tmi_webhooks::Error::AlreadyTerminal(_)) => {
                (StatusCode::CONFLICT, "conflict", self.to_string())
            }
            Self::Webhooks(tmi_webhooks::Error::PayloadTooLarge { .. })
            | Self::Webhooks(tmi_webhooks::Error::StatusPercentOutOfRange(_))
            | Self::Webhooks(tmi_webhooks::Error::InvalidTransition { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_input", self.to_string())
            }
            Self::Webhooks(_) | Self::RateLimit(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "unhandled server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", "internal server error".to_string())
            }
        };

        let mut response = (status, Json(ErrorBody { error: kind, error_description: description })).into_response();
        if let Self::RateLimited { retry_after_secs, .. } = self
            && let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
