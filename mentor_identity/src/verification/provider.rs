//! Code delivery providers.

use async_trait::async_trait;
use thiserror::Error;

use super::models::{PendingSecret, VerificationPurpose};
use crate::auth::AuthError;
use crate::identifier::{Identifier, IdentifierKind};

/// Failures talking to a code provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        AuthError::Provider(err.to_string())
    }
}

/// Sends codes over one channel and checks them later.
///
/// `send` returns whatever the provider needs to check a code afterwards;
/// the broker persists it untouched. `verify` answers `Ok(false)` for a
/// wrong code and reserves `Err` for provider failures.
#[async_trait]
pub trait CodeProvider: Send + Sync {
    /// Channel this provider serves
    fn channel(&self) -> IdentifierKind;

    async fn send(
        &self,
        identifier: &Identifier,
        purpose: VerificationPurpose,
    ) -> Result<PendingSecret, ProviderError>;

    async fn verify(
        &self,
        identifier: &Identifier,
        code: &str,
        secret: &PendingSecret,
    ) -> Result<bool, ProviderError>;
}
