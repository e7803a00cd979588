//! Mapping of library errors onto HTTP responses.

use axum::{Json, http::StatusCode};
use mentor_identity::AuthError;
use serde::Serialize;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine readable kind, e.g. `InvalidOrExpiredCode`
    pub kind: &'static str,
    /// Client-safe message
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for an error raised on an authentication endpoint.
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidFormat(_)
        | AuthError::PasswordMismatch
        | AuthError::PasswordPolicyViolation(_)
        | AuthError::UnsupportedChannel(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidOrExpiredCode
        | AuthError::InvalidCredentials
        | AuthError::InvalidAssertion(_)
        | AuthError::TokenInvalid
        | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::AlreadyRegistered | AuthError::DuplicateUser => StatusCode::CONFLICT,
        AuthError::TooManyAttempts | AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Upstream(_) | AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
        AuthError::Database(_)
        | AuthError::Serialization(_)
        | AuthError::HashingFailed
        | AuthError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an error into a response, logging the full detail of server-side
/// failures before it is sanitized.
pub fn api_error(err: AuthError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), "Request failed: {}", err);
    } else {
        tracing::debug!(kind = err.kind(), "Request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            kind: err.kind(),
            error: err.client_message(),
        }),
    )
}
