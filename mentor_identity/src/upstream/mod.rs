//! Upstream identity provider.
//!
//! Email/password accounts and Google/Apple assertions are owned by an
//! external identity service; local credentials only mirror its subject ids.

pub mod firebase;
pub mod memory;

pub use firebase::{FirebaseConfig, FirebaseIdentityProvider};
pub use memory::InMemoryIdentityProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::models::FederatedProvider;

/// Account handle returned by sign-up and sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAccount {
    pub uid: String,
    pub id_token: Option<String>,
    pub email: Option<String>,
}

/// Identity asserted by a verified federated id token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Sign-in providers linked to the upstream account
    pub linked_providers: Vec<FederatedProvider>,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("email already registered upstream")]
    EmailExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid id token: {0}")]
    InvalidToken(String),

    #[error("account not found")]
    NotFound,

    #[error("operation requires {0}")]
    NotConfigured(&'static str),

    #[error("upstream rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an email/password account
    async fn create_account(&self, email: &str, password: &str)
    -> Result<UpstreamAccount, UpstreamError>;

    /// Check an email/password pair
    async fn sign_in(&self, email: &str, password: &str) -> Result<UpstreamAccount, UpstreamError>;

    /// Verify a federated id token and describe its subject
    async fn verify_id_token(&self, id_token: &str) -> Result<FederatedIdentity, UpstreamError>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<UpstreamAccount>, UpstreamError>;

    async fn update_password(&self, uid: &str, new_password: &str) -> Result<(), UpstreamError>;
}
