//! Credential issuer: turns verified identifiers, passwords and federated
//! assertions into stored credentials and access tokens.

use std::sync::Arc;

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AccessToken, AccessTokenClaims, Credential, CredentialPatch, FederatedProvider,
        IssuedCredential, NewCredential,
    },
    password::{PasswordHasher, validate_password_policy},
    tokens::TokenService,
};
use crate::db::CredentialRepository;
use crate::identifier::{Identifier, IdentifierKind, classify};
use crate::upstream::{FederatedIdentity, IdentityProvider, UpstreamError};

/// Credential issuer
#[derive(Clone)]
pub struct CredentialIssuer {
    credentials: Arc<dyn CredentialRepository>,
    upstream: Arc<dyn IdentityProvider>,
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl CredentialIssuer {
    /// Create a new credential issuer
    ///
    /// # Arguments
    ///
    /// * `credentials` - Credential storage
    /// * `upstream` - Identity provider owning email accounts and federated sign-in
    /// * `hasher` - Peppered Argon2id hasher
    /// * `tokens` - Access token service
    pub fn new(
        credentials: Arc<dyn CredentialRepository>,
        upstream: Arc<dyn IdentityProvider>,
        hasher: PasswordHasher,
        tokens: TokenService,
    ) -> Self {
        Self {
            credentials,
            upstream,
            hasher,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a verified identifier with a password
    ///
    /// The caller must already hold proof that `identifier` passed a code
    /// check.
    ///
    /// # Errors
    ///
    /// * `AuthError::PasswordMismatch` - Confirmation differs
    /// * `AuthError::PasswordPolicyViolation` - Password too weak
    /// * `AuthError::DuplicateUser` - Identifier already registered locally, or
    ///   upstream under a different password
    /// * `AuthError::Upstream` - Upstream account creation failed
    pub async fn register_with_password(
        &self,
        identifier: &Identifier,
        password: &str,
        confirm_password: &str,
    ) -> AuthResult<IssuedCredential> {
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password_policy(password)?;

        if self.credentials.find_by_identifier(identifier).await?.is_some() {
            return Err(AuthError::DuplicateUser);
        }

        let external_id = match identifier.kind() {
            IdentifierKind::Email => {
                let account = self
                    .upstream
                    .create_account(identifier.normalized(), password)
                    .await;
                match account {
                    Ok(account) => account.uid,
                    Err(UpstreamError::EmailExists) => {
                        self.adopt_upstream_account(identifier, password).await?
                    }
                    Err(other) => return Err(AuthError::Upstream(other.to_string())),
                }
            }
            // Phone accounts never exist upstream; they get a local subject id
            // shaped like a federated one.
            IdentifierKind::Phone => format!("phone:{}", uuid::Uuid::new_v4().simple()),
        };

        let hash = self.hasher.hash(password)?;
        let credential = self
            .credentials
            .create(NewCredential::with_password(identifier, hash, Some(external_id)))
            .await?;

        log::info!("Registered {} credential {}", identifier.kind(), credential.id);

        let access_token = self.tokens.issue(&credential)?;
        Ok(IssuedCredential {
            credential,
            access_token,
        })
    }

    /// Upstream already has an account for this email but no local
    /// credential points at it, e.g. after a local insert failed on an
    /// earlier attempt. The account is adopted when `password` signs in.
    async fn adopt_upstream_account(
        &self,
        identifier: &Identifier,
        password: &str,
    ) -> AuthResult<String> {
        match self.upstream.sign_in(identifier.normalized(), password).await {
            Ok(account) => {
                log::info!("Adopting existing upstream account {}", account.uid);
                Ok(account.uid)
            }
            Err(UpstreamError::InvalidCredentials | UpstreamError::NotFound) => {
                Err(AuthError::DuplicateUser)
            }
            Err(other) => Err(AuthError::Upstream(other.to_string())),
        }
    }

    /// Log in with email and password
    ///
    /// The password is checked by the upstream identity provider; the local
    /// credential supplies role and admin flag.
    ///
    /// # Errors
    ///
    /// * `AuthError::UnsupportedChannel` - Phone identifiers cannot log in with a password
    /// * `AuthError::InvalidCredentials` - Wrong password or no local credential
    /// * `AuthError::Upstream` - Identity provider unreachable
    pub async fn login_with_password(
        &self,
        identifier: &Identifier,
        password: &str,
    ) -> AuthResult<AccessToken> {
        if identifier.kind() == IdentifierKind::Phone {
            return Err(AuthError::UnsupportedChannel(
                "password login is only available for email".to_string(),
            ));
        }

        let account = self
            .upstream
            .sign_in(identifier.normalized(), password)
            .await
            .map_err(|e| match e {
                UpstreamError::InvalidCredentials | UpstreamError::NotFound => {
                    log::warn!("Failed login for {}", identifier.masked());
                    AuthError::InvalidCredentials
                }
                other => AuthError::Upstream(other.to_string()),
            })?;

        let credential = match self.credentials.find_by_subject_id(&account.uid).await? {
            Some(credential) => Some(credential),
            None => self.credentials.find_by_identifier(identifier).await?,
        }
        .ok_or(AuthError::InvalidCredentials)?;

        self.tokens.issue(&credential)
    }

    /// Sign in with a Google or Apple id token, creating the credential on
    /// first use
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidAssertion` - Token rejected, or issued for another provider
    /// * `AuthError::DuplicateUser` - New subject whose email belongs to another credential
    /// * `AuthError::Upstream` - Identity provider unreachable
    pub async fn authenticate_federated(
        &self,
        provider: FederatedProvider,
        assertion: &str,
    ) -> AuthResult<IssuedCredential> {
        let identity = self
            .upstream
            .verify_id_token(assertion)
            .await
            .map_err(|e| match e {
                e @ (UpstreamError::Transport(_) | UpstreamError::Rejected { .. }) => {
                    AuthError::Upstream(e.to_string())
                }
                other => AuthError::InvalidAssertion(other.to_string()),
            })?;

        if !identity.linked_providers.contains(&provider) {
            log::warn!(
                "Federated assertion for {} is not linked to {}",
                identity.uid,
                provider
            );
            return Err(AuthError::InvalidAssertion(format!(
                "token was not issued by {provider}"
            )));
        }

        let credential = match self.credentials.find_by_subject_id(&identity.uid).await? {
            // Later sign-ins only fill in a missing display name.
            Some(existing) => match identity.name.clone() {
                Some(name) if existing.display_name.is_none() => {
                    self.credentials
                        .update(existing.id, CredentialPatch::default().display_name(name))
                        .await?
                }
                _ => existing,
            },
            None => self.create_federated(provider, &identity).await?,
        };

        let access_token = self.tokens.issue(&credential)?;
        Ok(IssuedCredential {
            credential,
            access_token,
        })
    }

    /// First sign-in of a federated subject.
    ///
    /// Concurrent first sign-ins for one subject race on `create`; the loser
    /// picks up the winner's row instead of failing.
    async fn create_federated(
        &self,
        provider: FederatedProvider,
        identity: &FederatedIdentity,
    ) -> AuthResult<Credential> {
        if let Some(identifier) = identity.email.as_deref().and_then(|e| classify(e).ok())
            && let Some(existing) = self.credentials.find_by_identifier(&identifier).await?
        {
            if existing.external_id.as_deref() == Some(identity.uid.as_str()) {
                return Ok(existing);
            }
            return Err(AuthError::DuplicateUser);
        }

        match self
            .credentials
            .create(NewCredential::federated(provider, identity))
            .await
        {
            Ok(created) => {
                log::info!("Created {} credential {}", provider, created.id);
                Ok(created)
            }
            Err(AuthError::DuplicateUser) => self
                .credentials
                .find_by_subject_id(&identity.uid)
                .await?
                .ok_or(AuthError::DuplicateUser),
            Err(e) => Err(e),
        }
    }

    /// Set a new password for a verified identifier
    ///
    /// # Errors
    ///
    /// * `AuthError::PasswordPolicyViolation` - Password too weak
    /// * `AuthError::UserNotFound` - No credential for the identifier
    /// * `AuthError::Upstream` - Upstream password update failed
    pub async fn reset_password(
        &self,
        identifier: &Identifier,
        new_password: &str,
    ) -> AuthResult<AccessToken> {
        validate_password_policy(new_password)?;

        let credential = self
            .credentials
            .find_by_identifier(identifier)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut patch = CredentialPatch::default();

        if identifier.kind() == IdentifierKind::Email {
            let uid = match &credential.external_id {
                Some(uid) => uid.clone(),
                None => {
                    let account = self
                        .upstream
                        .get_account_by_email(identifier.normalized())
                        .await
                        .map_err(|e| AuthError::Upstream(e.to_string()))?
                        .ok_or_else(|| {
                            AuthError::Upstream("no upstream account for email".to_string())
                        })?;
                    patch = patch.external_id(account.uid.clone());
                    account.uid
                }
            };

            self.upstream
                .update_password(&uid, new_password)
                .await
                .map_err(|e| AuthError::Upstream(e.to_string()))?;
        }

        let hash = self.hasher.hash(new_password)?;
        let updated = self
            .credentials
            .update(credential.id, patch.set_password(hash))
            .await?;

        log::info!("Password reset for credential {}", updated.id);

        self.tokens.issue(&updated)
    }

    /// Re-sign a valid access token with a fresh expiry
    pub fn refresh(&self, token: &str) -> AuthResult<AccessToken> {
        self.tokens.refresh(token)
    }

    /// Decode and validate an access token
    pub fn authenticate(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.tokens.verify(token)
    }

    /// Load the credential a token was issued for
    pub async fn credential_for(&self, claims: &AccessTokenClaims) -> AuthResult<Credential> {
        let id = claims.subject_id().ok_or(AuthError::TokenInvalid)?;
        self.credentials
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}
