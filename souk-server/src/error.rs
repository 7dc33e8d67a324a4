//! Error taxonomy of the messaging core and its HTTP rendering.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use souk_proto::message::ValidationError;

use crate::store::StoreError;

/// Errors surfaced by the messaging operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The caller is not the sender or not a participant.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Request body or parameters that could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Conversation or message absent.
    #[error("{0} not found")]
    NotFound(String),

    /// The sender is still inside its cooldown window.
    #[error("rate limited: retry in {retry_after_ms} ms")]
    RateLimited {
        /// Time left until the next send is accepted.
        retry_after_ms: u64,
    },

    /// Storage or transport failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Shorthand for [`ChatError::AccessDenied`].
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied(reason.into())
    }

    /// Machine-readable kind, used as the `error` field of response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AccessDenied(_) => "access_denied",
            Self::Validation(_) | Self::Malformed(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Unavailable(_) | StoreError::WriteFailed(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ChatError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
