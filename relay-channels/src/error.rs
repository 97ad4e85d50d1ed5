//! Error types for the relay.

use crate::completion::CompletionError;
use crate::traits::ChannelError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Session not found")]
    SessionNotFound(String),

    #[error("Session or user not found")]
    UserNotFound { session_id: String, user_id: String },

    #[error("QR not found")]
    QrNotFound(String),

    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Automation client error: {0}")]
    Client(#[from] ChannelError),

    #[error("Resource cleanup failed: {0}")]
    Cleanup(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::QrNotFound(_) => "QR_NOT_FOUND",
            Self::Completion(_) => "COMPLETION_FAILED",
            Self::Transcription(_) => "TRANSCRIPTION_FAILED",
            Self::Synthesis(_) => "SYNTHESIS_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Client(_) => "CLIENT_ERROR",
            Self::Cleanup(_) => "CLEANUP_FAILED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::UserNotFound { .. } | Self::QrNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Client(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Completion(_) | Self::Transcription(_) | Self::Synthesis(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cleanup(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Lookup failures are expected traffic, everything else is worth a warning.
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::UserNotFound { .. } | Self::QrNotFound(_)
        )
    }
}

/// API error body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if !self.is_not_found() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": ApiError {
                code: self.code().to_string(),
                message: self.to_string(),
            }
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}
