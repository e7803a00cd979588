//! Bearer token guard for protected endpoints.
//!
//! Extracts the access token from the `Authorization` header, validates it and
//! injects the decoded [`AccessTokenClaims`] into request extensions.
//!
//! # Extracting Claims
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use mentor_identity::auth::AccessTokenClaims;
//!
//! async fn protected_handler(Extension(claims): Extension<AccessTokenClaims>) -> String {
//!     format!("Authenticated as {}", claims.sub)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use super::AppState;
use super::errors::{ApiError, ErrorResponse};
use super::request_id::RequestId;
use crate::logging::log_security_event;

/// Authentication middleware that validates bearer tokens.
///
/// # Behavior
///
/// - **Success**: injects `AccessTokenClaims` into request extensions and calls the next handler
/// - **Missing or malformed header**: `401 Unauthorized`
/// - **Invalid or expired token**: `403 Forbidden`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                kind: "TokenInvalid",
                error: "Missing bearer token".to_string(),
            }),
        ));
    };

    match state.issuer.authenticate(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(err) => {
            let request_id = request.extensions().get::<RequestId>();
            log_security_event(
                "rejected_token",
                None,
                request_id.map(RequestId::as_str),
                &err.to_string(),
            );
            Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse {
                    kind: err.kind(),
                    error: err.client_message(),
                }),
            ))
        }
    }
}
