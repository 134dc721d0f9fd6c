use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure modes surfaced by the identity and session components.
///
/// Duplicate favorites and missing favorites are deliberately not here:
/// the store reports those as boolean / no-op outcomes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Incorrect email or password")]
    BadCredentials,

    /// Malformed, tampered or expired token. Callers get one uniform signal.
    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Could not validate credentials")]
    Unauthorized,

    /// The external identity provider misbehaved on a call that cannot
    /// degrade silently (sign-up / sign-in proxying).
    #[error("identity provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::BadRequest(_) | AuthError::DuplicateEmail => StatusCode::BAD_REQUEST,
            AuthError::BadCredentials | AuthError::InvalidToken | AuthError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
            return (status, Json(json!({ "detail": "Internal server error" }))).into_response();
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
