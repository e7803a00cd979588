//! Authentication error types.

use thiserror::Error;

use crate::identifier::InvalidIdentifier;

/// Authentication errors
///
/// Every variant maps to a stable, machine readable [`AuthError::kind`] that
/// callers can branch on without parsing messages.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Identifier is neither an email address nor a phone number
    #[error("Invalid identifier: {0}")]
    InvalidFormat(String),

    /// A credential already exists for the identifier a code was requested for
    #[error("An account already exists for this identifier")]
    AlreadyRegistered,

    /// Code missing, expired, already consumed or wrong
    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    /// Pending verification was discarded after too many wrong codes
    #[error("Too many incorrect codes, please request a new one")]
    TooManyAttempts,

    /// Password and confirmation differ
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Password too weak
    #[error("Password too weak: {0}")]
    PasswordPolicyViolation(String),

    /// A credential with the same identity already exists
    #[error("User already exists")]
    DuplicateUser,

    /// Upstream identity provider failed or refused the request
    #[error("Identity provider error: {0}")]
    Upstream(String),

    /// Operation not available for this identifier channel
    #[error("Unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// Email/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Federated identity assertion rejected
    #[error("Invalid identity assertion: {0}")]
    InvalidAssertion(String),

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Access token malformed or signed with another key
    #[error("Invalid access token")]
    TokenInvalid,

    /// Access token past its expiry
    #[error("Access token expired")]
    TokenExpired,

    /// Code delivery or provider side verification failed
    #[error("Verification provider error: {0}")]
    Provider(String),

    /// Rate limited
    #[error("Too many attempts, please try again later")]
    RateLimited,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Pending verification payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// JWT signing error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Stable error kind exposed to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidFormat(_) => "InvalidFormat",
            AuthError::AlreadyRegistered => "AlreadyRegistered",
            AuthError::InvalidOrExpiredCode => "InvalidOrExpiredCode",
            AuthError::TooManyAttempts => "TooManyAttempts",
            AuthError::PasswordMismatch => "PasswordMismatch",
            AuthError::PasswordPolicyViolation(_) => "PasswordPolicyViolation",
            AuthError::DuplicateUser => "DuplicateUser",
            AuthError::Upstream(_) => "UpstreamAuthError",
            AuthError::UnsupportedChannel(_) => "UnsupportedChannel",
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::InvalidAssertion(_) => "InvalidAssertion",
            AuthError::UserNotFound => "UserNotFound",
            AuthError::TokenInvalid => "TokenInvalid",
            AuthError::TokenExpired => "TokenExpired",
            AuthError::Provider(_) => "ProviderError",
            AuthError::RateLimited => "RateLimited",
            AuthError::Database(_) | AuthError::Serialization(_) => "Store",
            AuthError::HashingFailed => "Hashing",
            AuthError::JwtError(_) => "TokenSigning",
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store, hashing and signing errors are sanitized to prevent information
    /// disclosure about the internal system structure. Upstream messages are
    /// collapsed too since they may echo provider internals.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_)
            | AuthError::Serialization(_)
            | AuthError::HashingFailed
            | AuthError::JwtError(_) => "Internal server error".to_string(),
            AuthError::Upstream(_) => "Identity provider unavailable".to_string(),
            AuthError::Provider(_) => "Could not deliver or check the verification code".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<InvalidIdentifier> for AuthError {
    fn from(err: InvalidIdentifier) -> Self {
        AuthError::InvalidFormat(err.0)
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
