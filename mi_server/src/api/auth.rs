//! Authentication API handlers.
//!
//! Registration and password reset are two-step: a verification code is
//! requested and checked first, which yields a short-lived ticket; the ticket
//! is then redeemed together with the new password.
//!
//! # Examples
//!
//! Request a code:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/verification/request \
//!   -H "Content-Type: application/json" \
//!   -d '{"identifier": "trader@example.com"}'
//! ```
//!
//! Exchange it for a ticket, then register:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/verification/check \
//!   -H "Content-Type: application/json" \
//!   -d '{"identifier": "trader@example.com", "code": "123456"}'
//!
//! curl -X POST http://localhost:8080/api/v1/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"ticket": "eyJ...", "password": "Password123", "confirm_password": "Password123"}'
//! ```

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use mentor_identity::{
    AuthError, Identifier, IdentifierKind, classify,
    auth::{AccessToken, AccessTokenClaims, Credential, FederatedProvider, IssuedCredential},
    verification::{CodeDispatch, VerificationPurpose},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::errors::{ApiError, api_error};
use super::request_id::RequestId;
use crate::logging::log_security_event;
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct CodeRequestPayload {
    pub identifier: String,
    #[serde(default = "default_purpose")]
    pub purpose: VerificationPurpose,
}

#[derive(Debug, Deserialize)]
pub struct CodeCheckPayload {
    pub identifier: String,
    pub code: String,
    #[serde(default = "default_purpose")]
    pub purpose: VerificationPurpose,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub identifier: String,
    pub channel: IdentifierKind,
    pub purpose: VerificationPurpose,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub ticket: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct FederatedPayload {
    pub provider: FederatedProvider,
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordPayload {
    pub ticket: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub access_token: String,
}

fn default_purpose() -> VerificationPurpose {
    VerificationPurpose::Registration
}

fn parse_identifier(raw: &str) -> Result<Identifier, ApiError> {
    classify(raw).map_err(|e| api_error(e.into()))
}

/// Send a verification code to an email address or phone number.
///
/// # Request Body
///
/// ```json
/// { "identifier": "+15551234567", "purpose": "registration" }
/// ```
///
/// `purpose` is `registration` (default) or `password_reset`.
///
/// # Errors
///
/// - `400 Bad Request`: Not an email or phone number, or channel not configured
/// - `404 Not Found`: Password reset for an unknown identifier
/// - `409 Conflict`: Registration for an identifier that already has an account
/// - `429 Too Many Requests`: Too many codes requested for this identifier
/// - `502 Bad Gateway`: The code could not be delivered
pub async fn request_code(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<CodeRequestPayload>,
) -> Result<Json<CodeDispatch>, ApiError> {
    let identifier = parse_identifier(&payload.identifier)?;

    if let Err(retry_in) = state.throttle.check(identifier.normalized()).await {
        metrics::rate_limit_hits_total("verification_request");
        log_security_event(
            "code_request_throttled",
            Some(identifier.normalized()),
            Some(request_id.as_str()),
            &format!("Retry allowed in {}s", retry_in.as_secs()),
        );
        return Err(api_error(AuthError::RateLimited));
    }

    let dispatch = match payload.purpose {
        VerificationPurpose::Registration => state.broker.request_code(&identifier).await,
        VerificationPurpose::PasswordReset => state.broker.request_reset_code(&identifier).await,
    }
    .map_err(api_error)?;

    metrics::verification_requests_total(identifier.kind().as_str());
    Ok(Json(dispatch))
}

/// Check a verification code and receive a ticket for the next step.
///
/// # Request Body
///
/// ```json
/// { "identifier": "trader@example.com", "code": "123456", "purpose": "registration" }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Code wrong, expired or already used
/// - `429 Too Many Requests`: Too many wrong codes; a new code must be requested
pub async fn check_code(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<CodeCheckPayload>,
) -> Result<Json<TicketResponse>, ApiError> {
    let identifier = parse_identifier(&payload.identifier)?;
    let channel = identifier.kind().as_str();

    let result = match payload.purpose {
        VerificationPurpose::Registration => {
            state.broker.check_code(&identifier, &payload.code).await
        }
        VerificationPurpose::PasswordReset => {
            state.broker.check_reset_code(&identifier, &payload.code).await
        }
    };

    let verified = match result {
        Ok(verified) => verified,
        Err(err) => {
            metrics::verification_checks_total(channel, err.kind());
            match err {
                AuthError::TooManyAttempts => log_security_event(
                    "code_lockout",
                    Some(identifier.normalized()),
                    Some(request_id.as_str()),
                    "Pending verification discarded after repeated wrong codes",
                ),
                AuthError::InvalidOrExpiredCode => log_security_event(
                    "code_check_failed",
                    Some(identifier.normalized()),
                    Some(request_id.as_str()),
                    "Invalid or expired verification code",
                ),
                _ => {}
            }
            return Err(api_error(err));
        }
    };
    metrics::verification_checks_total(channel, "approved");

    let tokens = state.issuer.tokens();
    let ticket = tokens.issue_ticket(&verified).map_err(api_error)?;

    Ok(Json(TicketResponse {
        ticket,
        identifier: verified.identifier.normalized().to_string(),
        channel: verified.identifier.kind(),
        purpose: verified.purpose,
        expires_at: Utc::now() + tokens.ticket_duration(),
    }))
}

/// Create an account for a verified identifier.
///
/// # Request Body
///
/// ```json
/// { "ticket": "eyJ...", "password": "Password123", "confirm_password": "Password123" }
/// ```
///
/// # Response
///
/// `200 OK` with the stored credential and an access token.
///
/// # Errors
///
/// - `400 Bad Request`: Passwords differ or the password is too weak
/// - `401 Unauthorized`: Ticket missing, expired or issued for another purpose
/// - `409 Conflict`: Identifier already registered
/// - `502 Bad Gateway`: Upstream identity provider failure
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let verified = state
        .issuer
        .tokens()
        .verify_ticket(&payload.ticket, VerificationPurpose::Registration)
        .map_err(api_error)?;

    let issued = state
        .issuer
        .register_with_password(
            &verified.identifier,
            &payload.password,
            &payload.confirm_password,
        )
        .await
        .map_err(api_error)?;

    metrics::auth_tokens_issued_total("register");
    tracing::info!(credential_id = %issued.credential.id, "Credential registered");
    Ok(Json(issued))
}

/// Sign in with email and password.
///
/// # Errors
///
/// - `400 Bad Request`: Phone numbers cannot sign in with a password
/// - `401 Unauthorized`: Wrong email or password
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<AccessToken>, ApiError> {
    let identifier = parse_identifier(&payload.identifier)?;

    match state
        .issuer
        .login_with_password(&identifier, &payload.password)
        .await
    {
        Ok(token) => {
            metrics::auth_tokens_issued_total("login");
            Ok(Json(token))
        }
        Err(err) => {
            if matches!(err, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    Some(identifier.normalized()),
                    Some(request_id.as_str()),
                    "Invalid credentials",
                );
            }
            Err(api_error(err))
        }
    }
}

/// Sign in with a Google or Apple identity token.
///
/// Creates the credential on first use; later sign-ins return the same one.
///
/// # Request Body
///
/// ```json
/// { "provider": "google", "id_token": "eyJ..." }
/// ```
pub async fn federated(
    State(state): State<AppState>,
    Json(payload): Json<FederatedPayload>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let issued = state
        .issuer
        .authenticate_federated(payload.provider, &payload.id_token)
        .await
        .map_err(api_error)?;

    metrics::auth_tokens_issued_total("federated");
    Ok(Json(issued))
}

/// Set a new password using a `password_reset` ticket.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<AccessToken>, ApiError> {
    let verified = state
        .issuer
        .tokens()
        .verify_ticket(&payload.ticket, VerificationPurpose::PasswordReset)
        .map_err(api_error)?;

    let token = state
        .issuer
        .reset_password(&verified.identifier, &payload.new_password)
        .await
        .map_err(api_error)?;

    metrics::auth_tokens_issued_total("reset");
    Ok(Json(token))
}

/// Exchange a still-valid access token for a fresh one.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<AccessToken>, ApiError> {
    let token = state
        .issuer
        .refresh(&payload.access_token)
        .map_err(api_error)?;

    metrics::auth_tokens_issued_total("refresh");
    Ok(Json(token))
}

/// Credential of the authenticated caller.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessTokenClaims>,
) -> Result<Json<Credential>, ApiError> {
    let credential = state
        .issuer
        .credential_for(&claims)
        .await
        .map_err(api_error)?;
    Ok(Json(credential))
}
