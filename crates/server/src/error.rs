//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use helpdesk_core::error::{ErrorKind, HelpdeskError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Inbound email refused by the webhook checks.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// `detail` is only filled in development mode.
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl ApiError {
    /// Maps a domain error onto a response. Validation and not-found errors
    /// keep their own message; everything else becomes `message`.
    pub fn from_domain(err: HelpdeskError, message: &str, dev_mode: bool) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(user_message(&err)),
            ErrorKind::NotFound => ApiError::NotFound(user_message(&err)),
            ErrorKind::Dependency | ErrorKind::Configuration => {
                tracing::error!("{}: {}", message, err);
                ApiError::Internal {
                    message: message.to_string(),
                    detail: dev_mode.then(|| err.to_string()),
                }
            }
        }
    }
}

fn user_message(err: &HelpdeskError) -> String {
    match err.root() {
        HelpdeskError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected(reason) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "rejected", "reason": reason }),
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "message": message }),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "error", "message": message }),
            ),
            ApiError::Internal { message, detail } => {
                let mut body = json!({ "status": "error", "message": message });
                if let Some(detail) = detail {
                    body["error"] = detail.into();
                }
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
