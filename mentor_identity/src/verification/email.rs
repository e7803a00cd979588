//! Email channel: locally generated codes delivered by an [`EmailSender`].
//!
//! Only the SHA-256 of a code is persisted. Checks compare digests in
//! constant time.

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::models::{PendingSecret, VerificationPurpose};
use super::provider::{CodeProvider, ProviderError};
use crate::email::EmailSender;
use crate::identifier::{Identifier, IdentifierKind};

/// Number of digits in generated codes
pub const EMAIL_CODE_LENGTH: usize = 6;

type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Generate a random numeric code, zero padded
pub fn generate_code() -> String {
    let max = 10u32.pow(EMAIL_CODE_LENGTH as u32);
    format!("{:0width$}", rand::rng().random_range(0..max), width = EMAIL_CODE_LENGTH)
}

/// Hex SHA-256 of a code
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

pub struct EmailCodeProvider {
    sender: Arc<dyn EmailSender>,
    generator: CodeGenerator,
}

impl EmailCodeProvider {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self {
            sender,
            generator: Arc::new(generate_code),
        }
    }

    /// Replace the code generator, e.g. with a fixed code in tests.
    pub fn with_code_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }
}

#[async_trait]
impl CodeProvider for EmailCodeProvider {
    fn channel(&self) -> IdentifierKind {
        IdentifierKind::Email
    }

    async fn send(
        &self,
        identifier: &Identifier,
        purpose: VerificationPurpose,
    ) -> Result<PendingSecret, ProviderError> {
        let code = (self.generator)();
        let secret = PendingSecret::CodeHash(hash_code(&code));

        let sender = Arc::clone(&self.sender);
        let to = identifier.normalized().to_string();

        tokio::task::spawn_blocking(move || match purpose {
            VerificationPurpose::Registration => sender.send_verification_code(&to, &code),
            VerificationPurpose::PasswordReset => sender.send_password_reset(&to, &code),
        })
        .await
        .map_err(|e| ProviderError::Delivery(e.to_string()))?
        .map_err(|e| ProviderError::Delivery(e.to_string()))?;

        Ok(secret)
    }

    async fn verify(
        &self,
        _identifier: &Identifier,
        code: &str,
        secret: &PendingSecret,
    ) -> Result<bool, ProviderError> {
        let PendingSecret::CodeHash(expected) = secret else {
            return Ok(false);
        };

        let actual = hash_code(code);
        Ok(actual.as_bytes().ct_eq(expected.as_bytes()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailError;
    use crate::identifier::classify;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, &'static str)>>,
    }

    impl EmailSender for RecordingSender {
        fn send_verification_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string(), "verify"));
            Ok(())
        }

        fn send_password_reset(&self, email: &str, code: &str) -> Result<(), EmailError> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string(), "reset"));
            Ok(())
        }
    }

    struct FailingSender;

    impl EmailSender for FailingSender {
        fn send_verification_code(&self, _: &str, _: &str) -> Result<(), EmailError> {
            Err(EmailError::Transport("connection refused".into()))
        }

        fn send_password_reset(&self, _: &str, _: &str) -> Result<(), EmailError> {
            Err(EmailError::Transport("connection refused".into()))
        }
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), EMAIL_CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_send_stores_hash_not_code() {
        let sender = Arc::new(RecordingSender::default());
        let provider = EmailCodeProvider::new(sender.clone()).with_code_generator(|| "1234".into());
        let id = classify("Student@Example.com").unwrap();

        let secret = provider
            .send(&id, VerificationPurpose::Registration)
            .await
            .unwrap();

        assert_eq!(secret, PendingSecret::CodeHash(hash_code("1234")));
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("student@example.com".into(), "1234".into(), "verify"));
    }

    #[tokio::test]
    async fn test_reset_uses_reset_template() {
        let sender = Arc::new(RecordingSender::default());
        let provider = EmailCodeProvider::new(sender.clone());
        let id = classify("a@b.co").unwrap();

        provider
            .send(&id, VerificationPurpose::PasswordReset)
            .await
            .unwrap();

        assert_eq!(sender.sent.lock().unwrap()[0].2, "reset");
    }

    #[tokio::test]
    async fn test_verify_matches_hash() {
        let provider = EmailCodeProvider::new(Arc::new(RecordingSender::default()));
        let id = classify("a@b.co").unwrap();
        let secret = PendingSecret::CodeHash(hash_code("482913"));

        assert!(provider.verify(&id, "482913", &secret).await.unwrap());
        assert!(provider.verify(&id, " 482913 ", &secret).await.unwrap());
        assert!(!provider.verify(&id, "482914", &secret).await.unwrap());
        assert!(
            !provider
                .verify(&id, "482913", &PendingSecret::ProviderReference("x".into()))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported() {
        let provider = EmailCodeProvider::new(Arc::new(FailingSender));
        let id = classify("a@b.co").unwrap();

        let err = provider
            .send(&id, VerificationPurpose::Registration)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Delivery(msg) if msg.contains("refused")));
    }
}
