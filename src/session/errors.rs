//! Session error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::authority::TransportError;

/// Coarse classification used by callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorised,
    TryRefreshToken,
    TokenTheftDetected,
    MalformedInput,
    Transport,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// No valid session. Cookies are cleared when this reaches a response.
    #[error("unauthorised: {message}")]
    Unauthorised { message: String },
    /// The access token must be exchanged through the refresh token.
    #[error("try refresh token: {message}")]
    TryRefreshToken { message: String },
    /// A rotated refresh token was presented again.
    #[error("token theft detected for session {session_handle} of user {user_id}")]
    TokenTheftDetected {
        session_handle: String,
        user_id: String,
    },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn unauthorised(message: impl Into<String>) -> Self {
        SessionError::Unauthorised {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Unauthorised { .. } => ErrorKind::Unauthorised,
            SessionError::TryRefreshToken { .. } => ErrorKind::TryRefreshToken,
            SessionError::TokenTheftDetected { .. } => ErrorKind::TokenTheftDetected,
            SessionError::MalformedInput(_) => ErrorKind::MalformedInput,
            SessionError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether this outcome ends the session on the client side.
    pub fn clears_session(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Transport)
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Unauthorised | ErrorKind::TryRefreshToken | ErrorKind::TokenTheftDetected => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorKind::Transport => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_handle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let body = match &self {
            SessionError::Unauthorised { .. } => ErrorResponse {
                message: "unauthorised",
                session_handle: None,
                user_id: None,
            },
            SessionError::TryRefreshToken { .. } => ErrorResponse {
                message: "try refresh token",
                session_handle: None,
                user_id: None,
            },
            SessionError::TokenTheftDetected {
                session_handle,
                user_id,
            } => ErrorResponse {
                message: "token theft detected",
                session_handle: Some(session_handle),
                user_id: Some(user_id),
            },
            SessionError::MalformedInput(_) => ErrorResponse {
                message: "malformed input",
                session_handle: None,
                user_id: None,
            },
            // Core details stay in the logs.
            SessionError::Transport(_) => ErrorResponse {
                message: "session service unavailable",
                session_handle: None,
                user_id: None,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}
