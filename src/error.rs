//! Error types surfaced by dialog operations.
//!
//! Every failure carries a stable machine-readable [`DialogError::kind`] and a
//! human-readable message. Handlers return these directly; the
//! [`IntoResponse`] impl maps them onto status codes and a JSON body of the
//! form `{"error": "...", "kind": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure of a dialog, completion or session-registry operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// A required field was missing or blank. Correctable by the caller.
    #[error("{0}")]
    Validation(String),

    /// The model backend was unreachable, rejected the call, timed out, or
    /// returned a malformed or incomplete result.
    #[error("Failed to interact with LLM: {0}")]
    Upstream(String),

    /// Another turn is already in flight on this session.
    #[error("Session {0} is already awaiting a reply")]
    SessionBusy(String),

    /// No session is registered under the given id.
    #[error("Session {0} not found")]
    SessionNotFound(String),
}

impl DialogError {
    /// Stable identifier for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Upstream(_) => "upstream",
            Self::SessionBusy(_) => "session_busy",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// HTTP status used when this error reaches a client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SessionBusy(_) => StatusCode::CONFLICT,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for DialogError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Reject blank text, returning it unchanged otherwise.
///
/// # Errors
///
/// Returns [`DialogError::Validation`] carrying `message` when `text` is
/// missing or contains only whitespace.
pub fn require_text<'a>(text: Option<&'a str>, message: &str) -> Result<&'a str, DialogError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(DialogError::Validation(message.to_string())),
    }
}
