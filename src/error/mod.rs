use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extract::ExtractError;
use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Upstream request timed out")]
    GatewayTimeout,

    #[error("Internal server error")]
    Internal,
}

/// Fetch failures are reported against the upstream page, never retried.
impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::BadStatus(status) => {
                AppError::BadGateway(format!("Page responded with status {status}"))
            }
            FetchError::NonHtmlContent(content_type) => AppError::UnsupportedMedia(format!(
                "Page is not HTML (content type {content_type:?})"
            )),
            FetchError::NetworkFailure(_) => AppError::BadGateway("Failed to fetch URL".into()),
            FetchError::Timeout => AppError::GatewayTimeout,
            FetchError::PrivateAddress(_) => {
                AppError::Validation("URL resolves to a private or reserved address".into())
            }
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::InvalidPageUrl { .. } => AppError::Validation("Invalid URL".into()),
            ExtractError::Read(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                tracing::warn!(error = %e, "Page body timed out mid-read");
                AppError::GatewayTimeout
            }
            ExtractError::Read(e) => {
                tracing::warn!(error = %e, "Page body failed mid-read");
                AppError::BadGateway("Failed to read page body".into())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AppError::MissingParameter(name) => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Bad Request: missing `{name}` query parameter"),
                )
                    .into_response();
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::UnsupportedMedia(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            AppError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Timed out fetching URL".into(),
            ),
            AppError::Internal => {
                tracing::error!("Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
