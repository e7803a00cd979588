//! Verification broker: routes code requests and checks to the provider
//! registered for the identifier's channel and keeps the pending state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::models::{
    CodeDispatch, ConsumptionPolicy, PendingVerification, Verified, VerificationConfig,
    VerificationPurpose, pending_key,
};
use super::provider::CodeProvider;
use super::store::VerificationStore;
use crate::auth::{AuthError, AuthResult};
use crate::db::CredentialRepository;
use crate::identifier::{Identifier, IdentifierKind};

/// Verification broker
pub struct VerificationBroker {
    store: Arc<dyn VerificationStore>,
    credentials: Arc<dyn CredentialRepository>,
    providers: HashMap<IdentifierKind, Arc<dyn CodeProvider>>,
    config: VerificationConfig,
}

impl VerificationBroker {
    /// Create a broker with no providers registered
    ///
    /// # Arguments
    ///
    /// * `store` - Pending verification storage
    /// * `credentials` - Used to check whether an identifier is registered
    /// * `config` - Expiry, attempt limit and consumption policies
    pub fn new(
        store: Arc<dyn VerificationStore>,
        credentials: Arc<dyn CredentialRepository>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            providers: HashMap::new(),
            config,
        }
    }

    /// Register the provider for its channel, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn CodeProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn supports(&self, kind: IdentifierKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Send a sign-up code
    ///
    /// # Errors
    ///
    /// * `AuthError::AlreadyRegistered` - A credential exists for the identifier
    /// * `AuthError::UnsupportedChannel` - No provider for the channel
    /// * `AuthError::Provider` - Delivery failed
    pub async fn request_code(&self, identifier: &Identifier) -> AuthResult<CodeDispatch> {
        self.request_code_at(identifier, VerificationPurpose::Registration, Utc::now())
            .await
    }

    /// Send a password reset code
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - No credential for the identifier
    /// * `AuthError::UnsupportedChannel` - No provider for the channel
    /// * `AuthError::Provider` - Delivery failed
    pub async fn request_reset_code(&self, identifier: &Identifier) -> AuthResult<CodeDispatch> {
        self.request_code_at(identifier, VerificationPurpose::PasswordReset, Utc::now())
            .await
    }

    pub async fn request_code_at(
        &self,
        identifier: &Identifier,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> AuthResult<CodeDispatch> {
        let registered = self.credentials.find_by_identifier(identifier).await?.is_some();
        match purpose {
            VerificationPurpose::Registration if registered => {
                return Err(AuthError::AlreadyRegistered);
            }
            VerificationPurpose::PasswordReset if !registered => {
                return Err(AuthError::UserNotFound);
            }
            _ => {}
        }

        let provider = self.provider(identifier.kind())?;
        let secret = provider.send(identifier, purpose).await.map_err(|e| {
            log::error!("Code dispatch to {} failed: {}", identifier.masked(), e);
            AuthError::from(e)
        })?;

        let pending = PendingVerification::new(
            identifier.clone(),
            purpose,
            secret,
            now,
            self.config.code_ttl,
        );
        self.store.put(&pending).await?;

        log::info!(
            "Sent {} code via {} to {}",
            purpose,
            identifier.kind(),
            identifier.masked()
        );

        Ok(CodeDispatch {
            channel: identifier.kind(),
            expires_at: pending.expires_at,
        })
    }

    /// Check a sign-up code
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidOrExpiredCode` - No pending code, expired, already
    ///   consumed or wrong
    /// * `AuthError::TooManyAttempts` - This wrong code exhausted the attempt limit
    /// * `AuthError::Provider` - Provider side check failed
    pub async fn check_code(&self, identifier: &Identifier, code: &str) -> AuthResult<Verified> {
        self.check_code_at(identifier, VerificationPurpose::Registration, code, Utc::now())
            .await
    }

    /// Check a password reset code
    pub async fn check_reset_code(
        &self,
        identifier: &Identifier,
        code: &str,
    ) -> AuthResult<Verified> {
        self.check_code_at(identifier, VerificationPurpose::PasswordReset, code, Utc::now())
            .await
    }

    pub async fn check_code_at(
        &self,
        identifier: &Identifier,
        purpose: VerificationPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Verified> {
        let key = pending_key(purpose, identifier);

        let Some(pending) = self.store.get(&key).await? else {
            return Err(AuthError::InvalidOrExpiredCode);
        };

        if pending.is_expired_at(now) {
            self.store.compare_and_delete(&key, pending.nonce).await?;
            return Err(AuthError::InvalidOrExpiredCode);
        }

        let provider = self.provider(identifier.kind())?;
        let matched = provider.verify(identifier, code, &pending.secret).await?;

        if !matched {
            let failures = self.store.record_failure(&key, pending.nonce).await?;
            return match failures {
                Some(count) if self.config.max_attempts > 0 && count >= self.config.max_attempts => {
                    self.store.compare_and_delete(&key, pending.nonce).await?;
                    log::warn!(
                        "Pending {} verification for {} dropped after {} wrong codes",
                        purpose,
                        identifier.masked(),
                        count
                    );
                    Err(AuthError::TooManyAttempts)
                }
                _ => Err(AuthError::InvalidOrExpiredCode),
            };
        }

        if self.config.consumption_for(identifier.kind()) == ConsumptionPolicy::ConsumeOnSuccess
            && !self.store.compare_and_delete(&key, pending.nonce).await?
        {
            // Another check consumed the entry first.
            return Err(AuthError::InvalidOrExpiredCode);
        }

        Ok(Verified {
            identifier: identifier.clone(),
            purpose,
            verified_at: now,
        })
    }

    /// Remove expired pending entries
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        if purged > 0 {
            log::debug!("Purged {} expired verification codes", purged);
        }
        Ok(purged)
    }

    fn provider(&self, kind: IdentifierKind) -> AuthResult<&Arc<dyn CodeProvider>> {
        self.providers
            .get(&kind)
            .ok_or_else(|| AuthError::UnsupportedChannel(kind.to_string()))
    }
}
