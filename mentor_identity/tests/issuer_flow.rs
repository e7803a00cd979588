//! Integration tests for credential issuance.
//!
//! Tests registration, login, federated sign-in, password reset and token
//! refresh end to end against in-memory dependencies.

mod common;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use common::{EMAIL_CODE, Harness, SMS_CODE};
use mentor_identity::auth::models::{Credential, CredentialId, CredentialPatch, NewCredential};
use mentor_identity::auth::{
    AuthError, AuthResult, CredentialIssuer, FederatedProvider, PasswordHasher, Role,
    SignInMethod,
};
use mentor_identity::db::{CredentialRepository, InMemoryCredentialRepository};
use mentor_identity::identifier::{Identifier, classify};
use mentor_identity::upstream::{FederatedIdentity, IdentityProvider};
use mentor_identity::verification::VerificationPurpose;
use std::sync::Arc;

fn google_identity(uid: &str, email: &str, name: Option<&str>) -> FederatedIdentity {
    FederatedIdentity {
        uid: uid.to_string(),
        email: Some(email.to_string()),
        name: name.map(str::to_string),
        linked_providers: vec![FederatedProvider::Google],
    }
}

#[tokio::test]
async fn test_email_registration_end_to_end() {
    let harness = Harness::new();
    let id = classify("  New.Mentor@Example.com ").unwrap();

    harness.broker.request_code(&id).await.unwrap();
    let verified = harness.broker.check_code(&id, EMAIL_CODE).await.unwrap();

    // Carry the verified state across requests the way the HTTP layer does.
    let ticket = harness.tokens.issue_ticket(&verified).unwrap();
    let redeemed = harness
        .tokens
        .verify_ticket(&ticket, VerificationPurpose::Registration)
        .unwrap();

    let issued = harness
        .issuer
        .register_with_password(&redeemed.identifier, "Password123", "Password123")
        .await
        .unwrap();

    let credential = &issued.credential;
    assert_eq!(credential.email.as_deref(), Some("new.mentor@example.com"));
    assert!(credential.is_verified);
    assert_eq!(credential.provider, SignInMethod::Email);
    assert_eq!(credential.role, Role::Free);
    assert!(credential.external_id.is_some());
    assert!(credential.password_hash.as_deref().unwrap().starts_with("$argon2id$"));
    assert_eq!(harness.upstream.account_count().await, 1);

    let claims = harness.tokens.verify(&issued.access_token.token).unwrap();
    assert_eq!(claims.subject_id(), Some(credential.id));
    assert_eq!(claims.external_id, credential.external_id);
    assert!(!claims.is_admin);

    // A second code request for the same identifier is refused.
    assert!(matches!(
        harness.broker.request_code(&id).await,
        Err(AuthError::AlreadyRegistered)
    ));
}

#[tokio::test]
async fn test_second_registration_is_duplicate() {
    let harness = Harness::new();
    let id = classify("twice@example.com").unwrap();

    harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();

    assert!(matches!(
        harness
            .issuer
            .register_with_password(&id, "Password456", "Password456")
            .await,
        Err(AuthError::DuplicateUser)
    ));
}

#[tokio::test]
async fn test_registration_validates_passwords_first() {
    let harness = Harness::new();
    let id = classify("weak@example.com").unwrap();

    assert!(matches!(
        harness.issuer.register_with_password(&id, "Password123", "Password124").await,
        Err(AuthError::PasswordMismatch)
    ));
    assert!(matches!(
        harness.issuer.register_with_password(&id, "short1", "short1").await,
        Err(AuthError::PasswordPolicyViolation(_))
    ));
    assert!(matches!(
        harness
            .issuer
            .register_with_password(&id, "longenoughbutnodigit", "longenoughbutnodigit")
            .await,
        Err(AuthError::PasswordPolicyViolation(_))
    ));
    assert!(harness.credentials.is_empty().await);
    assert_eq!(harness.upstream.account_count().await, 0);
}

#[tokio::test]
async fn test_upstream_account_with_other_password_is_duplicate() {
    let harness = Harness::new();
    harness
        .upstream
        .create_account("taken@example.com", "Password123")
        .await
        .unwrap();

    let id = classify("taken@example.com").unwrap();
    assert!(matches!(
        harness.issuer.register_with_password(&id, "Different456", "Different456").await,
        Err(AuthError::DuplicateUser)
    ));
    assert!(harness.credentials.is_empty().await);
}

#[tokio::test]
async fn test_registration_adopts_orphaned_upstream_account() {
    let harness = Harness::new();
    // Upstream account left behind by a registration whose local insert failed.
    let orphan = harness
        .upstream
        .create_account("orphan@example.com", "Password123")
        .await
        .unwrap();

    let id = classify("orphan@example.com").unwrap();
    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();
    assert_eq!(issued.credential.external_id.as_deref(), Some(orphan.uid.as_str()));
    assert_eq!(harness.upstream.account_count().await, 1);

    let token = harness.issuer.login_with_password(&id, "Password123").await.unwrap();
    let claims = harness.tokens.verify(&token.token).unwrap();
    assert_eq!(claims.subject_id(), Some(issued.credential.id));
}

#[tokio::test]
async fn test_phone_registration_gets_local_subject() {
    let harness = Harness::new();
    let id = classify("+2348012345678").unwrap();

    harness.broker.request_code(&id).await.unwrap();
    harness.broker.check_code(&id, SMS_CODE).await.unwrap();

    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();

    assert_eq!(issued.credential.phone_number.as_deref(), Some("+2348012345678"));
    assert_eq!(issued.credential.provider, SignInMethod::Phone);
    assert!(issued.credential.external_id.as_deref().unwrap().starts_with("phone:"));
    assert_eq!(harness.upstream.account_count().await, 0);
}

#[tokio::test]
async fn test_login_with_password() {
    let harness = Harness::new();
    let id = classify("login@example.com").unwrap();
    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();

    let token = harness
        .issuer
        .login_with_password(&classify("LOGIN@example.com").unwrap(), "Password123")
        .await
        .unwrap();
    let claims = harness.tokens.verify(&token.token).unwrap();
    assert_eq!(claims.subject_id(), Some(issued.credential.id));

    assert!(matches!(
        harness.issuer.login_with_password(&id, "Password999").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        harness
            .issuer
            .login_with_password(&classify("ghost@example.com").unwrap(), "Password123")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_login_carries_local_role() {
    let harness = Harness::new();
    let id = classify("vip@example.com").unwrap();
    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();
    harness
        .credentials
        .update(
            issued.credential.id,
            mentor_identity::auth::CredentialPatch::default().role(Role::Vvip),
        )
        .await
        .unwrap();

    let token = harness.issuer.login_with_password(&id, "Password123").await.unwrap();
    assert_eq!(harness.tokens.verify(&token.token).unwrap().role, Role::Vvip);
}

#[tokio::test]
async fn test_phone_login_is_unsupported() {
    let harness = Harness::new();
    let id = classify("+15551239999").unwrap();
    harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();

    assert!(matches!(
        harness.issuer.login_with_password(&id, "Password123").await,
        Err(AuthError::UnsupportedChannel(_))
    ));
}

#[tokio::test]
async fn test_upstream_account_without_local_credential_cannot_log_in() {
    let harness = Harness::new();
    harness
        .upstream
        .create_account("orphan@example.com", "Password123")
        .await
        .unwrap();

    let result = harness
        .issuer
        .login_with_password(&classify("orphan@example.com").unwrap(), "Password123")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_federated_sign_in_is_idempotent_and_keeps_first_name() {
    let harness = Harness::new();
    harness
        .upstream
        .register_federated_token("tok-1", google_identity("g-1", "student@gmail.com", Some("First")))
        .await;
    harness
        .upstream
        .register_federated_token("tok-2", google_identity("g-1", "student@gmail.com", Some("Second")))
        .await;

    let first = harness
        .issuer
        .authenticate_federated(FederatedProvider::Google, "tok-1")
        .await
        .unwrap();
    let second = harness
        .issuer
        .authenticate_federated(FederatedProvider::Google, "tok-2")
        .await
        .unwrap();

    assert_eq!(first.credential.id, second.credential.id);
    assert_eq!(second.credential.display_name.as_deref(), Some("First"));
    assert!(second.credential.password_hash.is_none());
    assert_eq!(second.credential.provider, SignInMethod::Google);
    assert_eq!(harness.credentials.len().await, 1);
}

/// Holds every subject lookup long enough for concurrent sign-ins to all
/// miss before any of them inserts.
struct SlowLookupRepository(InMemoryCredentialRepository);

#[async_trait]
impl CredentialRepository for SlowLookupRepository {
    async fn find_by_identifier(&self, identifier: &Identifier) -> AuthResult<Option<Credential>> {
        self.0.find_by_identifier(identifier).await
    }

    async fn find_by_subject_id(&self, external_id: &str) -> AuthResult<Option<Credential>> {
        let found = self.0.find_by_subject_id(external_id).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        found
    }

    async fn find_by_id(&self, id: CredentialId) -> AuthResult<Option<Credential>> {
        self.0.find_by_id(id).await
    }

    async fn create(&self, credential: NewCredential) -> AuthResult<Credential> {
        self.0.create(credential).await
    }

    async fn update(&self, id: CredentialId, patch: CredentialPatch) -> AuthResult<Credential> {
        self.0.update(id, patch).await
    }
}

#[tokio::test]
async fn test_concurrent_first_federated_sign_ins_share_one_credential() {
    let harness = Harness::new();
    harness
        .upstream
        .register_federated_token("tok", google_identity("g-race", "racer@gmail.com", Some("Racer")))
        .await;

    let repository = Arc::new(SlowLookupRepository(InMemoryCredentialRepository::new()));
    let issuer = CredentialIssuer::new(
        repository.clone(),
        harness.upstream.clone(),
        PasswordHasher::new("integration-pepper"),
        harness.tokens.clone(),
    );

    let first = tokio::spawn({
        let issuer = issuer.clone();
        async move { issuer.authenticate_federated(FederatedProvider::Google, "tok").await }
    });
    let second = tokio::spawn({
        let issuer = issuer.clone();
        async move { issuer.authenticate_federated(FederatedProvider::Google, "tok").await }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.credential.id, second.credential.id);
    assert_eq!(repository.0.len().await, 1);
}

#[tokio::test]
async fn test_federated_sign_in_fills_missing_name() {
    let harness = Harness::new();
    harness
        .upstream
        .register_federated_token("anon", google_identity("g-2", "a@gmail.com", None))
        .await;
    harness
        .upstream
        .register_federated_token("named", google_identity("g-2", "a@gmail.com", Some("Ada")))
        .await;

    harness
        .issuer
        .authenticate_federated(FederatedProvider::Google, "anon")
        .await
        .unwrap();
    let named = harness
        .issuer
        .authenticate_federated(FederatedProvider::Google, "named")
        .await
        .unwrap();
    assert_eq!(named.credential.display_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_federated_rejections() {
    let harness = Harness::new();
    harness
        .upstream
        .register_federated_token("google-tok", google_identity("g-3", "b@gmail.com", None))
        .await;

    assert!(matches!(
        harness
            .issuer
            .authenticate_federated(FederatedProvider::Apple, "google-tok")
            .await,
        Err(AuthError::InvalidAssertion(_))
    ));
    assert!(matches!(
        harness
            .issuer
            .authenticate_federated(FederatedProvider::Google, "forged")
            .await,
        Err(AuthError::InvalidAssertion(_))
    ));
}

#[tokio::test]
async fn test_federated_email_collision_is_duplicate() {
    let harness = Harness::new();
    harness
        .issuer
        .register_with_password(&classify("shared@example.com").unwrap(), "Password123", "Password123")
        .await
        .unwrap();
    harness
        .upstream
        .register_federated_token("tok", google_identity("g-4", "Shared@Example.com", None))
        .await;

    assert!(matches!(
        harness
            .issuer
            .authenticate_federated(FederatedProvider::Google, "tok")
            .await,
        Err(AuthError::DuplicateUser)
    ));
}

#[tokio::test]
async fn test_password_reset_updates_upstream_and_local_hash() {
    let harness = Harness::new();
    let id = classify("forgetful@example.com").unwrap();
    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();
    let old_hash = issued.credential.password_hash.clone();

    harness.broker.request_reset_code(&id).await.unwrap();
    harness.broker.check_reset_code(&id, EMAIL_CODE).await.unwrap();

    let token = harness.issuer.reset_password(&id, "Changed456").await.unwrap();
    assert!(harness.tokens.verify(&token.token).is_ok());

    let stored = harness.credentials.find_by_id(issued.credential.id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, old_hash);

    assert!(harness.issuer.login_with_password(&id, "Changed456").await.is_ok());
    assert!(matches!(
        harness.issuer.login_with_password(&id, "Password123").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_password_reset_errors() {
    let harness = Harness::new();
    let id = classify("missing@example.com").unwrap();

    assert!(matches!(
        harness.issuer.reset_password(&id, "short").await,
        Err(AuthError::PasswordPolicyViolation(_))
    ));
    assert!(matches!(
        harness.issuer.reset_password(&id, "Password123").await,
        Err(AuthError::UserNotFound)
    ));
}

#[tokio::test]
async fn test_phone_password_reset_is_local() {
    let harness = Harness::new();
    let id = classify("+15551238888").unwrap();
    let issued = harness
        .issuer
        .register_with_password(&id, "Password123", "Password123")
        .await
        .unwrap();

    harness.issuer.reset_password(&id, "Changed456").await.unwrap();

    let stored = harness.credentials.find_by_id(issued.credential.id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, issued.credential.password_hash);
    assert_eq!(harness.upstream.account_count().await, 0);
}

#[tokio::test]
async fn test_refresh_window() {
    let harness = Harness::new();
    let issued = harness
        .issuer
        .register_with_password(&classify("refresh@example.com").unwrap(), "Password123", "Password123")
        .await
        .unwrap();

    let t = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let token = harness.tokens.issue_at(&issued.credential, t).unwrap();

    let refreshed = harness
        .tokens
        .refresh_at(&token.token, t + Duration::hours(24))
        .unwrap();
    assert_eq!(refreshed.expires_at, t + Duration::hours(48));

    assert!(matches!(
        harness
            .tokens
            .refresh_at(&token.token, t + Duration::hours(24) + Duration::seconds(1)),
        Err(AuthError::TokenExpired)
    ));
    assert!(matches!(
        harness.issuer.refresh("garbage"),
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn test_credential_for_token() {
    let harness = Harness::new();
    let issued = harness
        .issuer
        .register_with_password(&classify("me@example.com").unwrap(), "Password123", "Password123")
        .await
        .unwrap();

    let claims = harness.issuer.authenticate(&issued.access_token.token).unwrap();
    let credential = harness.issuer.credential_for(&claims).await.unwrap();
    assert_eq!(credential.id, issued.credential.id);
}
