//! Shared wiring for the integration tests: every dependency in memory,
//! email codes fixed to "1234" and a scripted SMS provider.

#![allow(dead_code)]

use async_trait::async_trait;
use mentor_identity::auth::{CredentialIssuer, PasswordHasher, TokenService};
use mentor_identity::db::InMemoryCredentialRepository;
use mentor_identity::email::{EmailError, EmailSender};
use mentor_identity::identifier::{Identifier, IdentifierKind};
use mentor_identity::upstream::InMemoryIdentityProvider;
use mentor_identity::verification::{
    CodeProvider, EmailCodeProvider, InMemoryVerificationStore, PendingSecret, ProviderError,
    VerificationBroker, VerificationConfig, VerificationPurpose,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const EMAIL_CODE: &str = "1234";
pub const SMS_CODE: &str = "246810";
pub const JWT_SECRET: &str = "integration_test_jwt_secret_0123456789";

pub struct NullEmailSender;

impl EmailSender for NullEmailSender {
    fn send_verification_code(&self, _: &str, _: &str) -> Result<(), EmailError> {
        Ok(())
    }

    fn send_password_reset(&self, _: &str, _: &str) -> Result<(), EmailError> {
        Ok(())
    }
}

/// Stands in for Twilio: accepts [`SMS_CODE`] and counts calls.
#[derive(Default)]
pub struct ScriptedSmsProvider {
    pub sent: AtomicUsize,
    pub checked: AtomicUsize,
}

#[async_trait]
impl CodeProvider for ScriptedSmsProvider {
    fn channel(&self) -> IdentifierKind {
        IdentifierKind::Phone
    }

    async fn send(
        &self,
        identifier: &Identifier,
        _purpose: VerificationPurpose,
    ) -> Result<PendingSecret, ProviderError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(PendingSecret::ProviderReference(format!(
            "VE{n}-{}",
            identifier.normalized()
        )))
    }

    async fn verify(
        &self,
        _identifier: &Identifier,
        code: &str,
        _secret: &PendingSecret,
    ) -> Result<bool, ProviderError> {
        self.checked.fetch_add(1, Ordering::SeqCst);
        Ok(code == SMS_CODE)
    }
}

pub struct Harness {
    pub credentials: Arc<InMemoryCredentialRepository>,
    pub store: Arc<InMemoryVerificationStore>,
    pub upstream: Arc<InMemoryIdentityProvider>,
    pub sms: Arc<ScriptedSmsProvider>,
    pub broker: VerificationBroker,
    pub issuer: CredentialIssuer,
    pub tokens: TokenService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(VerificationConfig::default())
    }

    pub fn with_config(config: VerificationConfig) -> Self {
        let credentials = Arc::new(InMemoryCredentialRepository::new());
        let store = Arc::new(InMemoryVerificationStore::new());
        let upstream = Arc::new(InMemoryIdentityProvider::new());
        let sms = Arc::new(ScriptedSmsProvider::default());
        let tokens = TokenService::new(JWT_SECRET);

        let email = EmailCodeProvider::new(Arc::new(NullEmailSender))
            .with_code_generator(|| EMAIL_CODE.to_string());

        let broker = VerificationBroker::new(store.clone(), credentials.clone(), config)
            .with_provider(Arc::new(email))
            .with_provider(sms.clone());

        let issuer = CredentialIssuer::new(
            credentials.clone(),
            upstream.clone(),
            PasswordHasher::new("integration-pepper"),
            tokens.clone(),
        );

        Self {
            credentials,
            store,
            upstream,
            sms,
            broker,
            issuer,
            tokens,
        }
    }
}
