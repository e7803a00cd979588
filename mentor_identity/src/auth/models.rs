//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::password::HashedPassword;
use crate::identifier::{Identifier, IdentifierKind};
use crate::upstream::FederatedIdentity;
use crate::verification::VerificationPurpose;

/// Credential ID type
pub type CredentialId = Uuid;

/// Unknown value while decoding a stored enum column
#[derive(Debug, Error)]
#[error("unknown {field} value '{value}'")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

/// Subscription tier carried in every access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Free,
    Premium,
    Vvip,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Free => "FREE",
            Role::Premium => "PREMIUM",
            Role::Vvip => "VVIP",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Role::Free),
            "PREMIUM" => Ok(Role::Premium),
            "VVIP" => Ok(Role::Vvip),
            _ => Err(UnknownVariant {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Third-party identity providers accepted for federated sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
    Apple,
}

impl FederatedProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            FederatedProvider::Google => "google",
            FederatedProvider::Apple => "apple",
        }
    }
}

impl fmt::Display for FederatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a credential was first established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInMethod {
    Email,
    Phone,
    Google,
    Apple,
}

impl SignInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignInMethod::Email => "email",
            SignInMethod::Phone => "phone",
            SignInMethod::Google => "google",
            SignInMethod::Apple => "apple",
        }
    }
}

impl From<IdentifierKind> for SignInMethod {
    fn from(kind: IdentifierKind) -> Self {
        match kind {
            IdentifierKind::Email => SignInMethod::Email,
            IdentifierKind::Phone => SignInMethod::Phone,
        }
    }
}

impl From<FederatedProvider> for SignInMethod {
    fn from(provider: FederatedProvider) -> Self {
        match provider {
            FederatedProvider::Google => SignInMethod::Google,
            FederatedProvider::Apple => SignInMethod::Apple,
        }
    }
}

impl FromStr for SignInMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(SignInMethod::Email),
            "phone" => Ok(SignInMethod::Phone),
            "google" => Ok(SignInMethod::Google),
            "apple" => Ok(SignInMethod::Apple),
            _ => Err(UnknownVariant {
                field: "provider",
                value: s.to_string(),
            }),
        }
    }
}

/// Durable user identity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    /// Subject id at the upstream identity provider, or a synthesized local id
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub is_verified: bool,
    pub is_admin: bool,
    pub provider: SignInMethod,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a credential.
///
/// Only constructible through [`NewCredential::with_password`] and
/// [`NewCredential::federated`], which between them guarantee that an
/// identity handle is present and that a password hash exists unless the
/// record is federated.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub(crate) email: Option<String>,
    pub(crate) phone_number: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) external_id: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) provider: SignInMethod,
}

impl NewCredential {
    /// Password-backed credential for a verified email or phone identifier.
    pub fn with_password(
        identifier: &Identifier,
        password: HashedPassword,
        external_id: Option<String>,
    ) -> Self {
        let (email, phone_number) = match identifier.kind() {
            IdentifierKind::Email => (Some(identifier.normalized().to_string()), None),
            IdentifierKind::Phone => (None, Some(identifier.normalized().to_string())),
        };

        Self {
            email,
            phone_number,
            password_hash: Some(password.into_string()),
            external_id,
            display_name: None,
            provider: identifier.kind().into(),
        }
    }

    /// Credential created on the first Google/Apple sign-in.
    pub fn federated(provider: FederatedProvider, identity: &FederatedIdentity) -> Self {
        Self {
            email: identity.email.as_ref().map(|e| e.trim().to_lowercase()),
            phone_number: None,
            password_hash: None,
            external_id: Some(identity.uid.clone()),
            display_name: identity.name.clone(),
            provider: provider.into(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn provider(&self) -> SignInMethod {
        self.provider
    }

    /// Materialize the record as a store would after inserting it.
    pub fn into_credential(self, id: CredentialId, now: DateTime<Utc>) -> Credential {
        Credential {
            id,
            email: self.email,
            phone_number: self.phone_number,
            password_hash: self.password_hash,
            external_id: self.external_id,
            display_name: self.display_name,
            is_verified: true,
            is_admin: false,
            provider: self.provider,
            role: Role::Free,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied by [`crate::db::CredentialRepository::update`].
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub(crate) password_hash: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) role: Option<Role>,
    pub(crate) external_id: Option<String>,
}

impl CredentialPatch {
    /// Replace the stored password hash. The hash is produced once by
    /// [`super::password::PasswordHasher::hash`]; stores never rehash.
    pub fn set_password(mut self, password: HashedPassword) -> Self {
        self.password_hash = Some(password.into_string());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.password_hash.is_none()
            && self.display_name.is_none()
            && self.role.is_none()
            && self.external_id.is_none()
    }

    /// Apply the patch to an in-memory record.
    pub fn apply(self, credential: &mut Credential, now: DateTime<Utc>) {
        if let Some(hash) = self.password_hash {
            credential.password_hash = Some(hash);
        }
        if let Some(name) = self.display_name {
            credential.display_name = Some(name);
        }
        if let Some(role) = self.role {
            credential.role = role;
        }
        if let Some(external_id) = self.external_id {
            credential.external_id = Some(external_id);
        }
        credential.updated_at = now;
    }
}

/// JWT claims for access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String, // Credential ID
    pub external_id: Option<String>,
    pub is_admin: bool,
    pub role: Role,
    pub exp: i64, // Expiration timestamp
    pub iat: i64, // Issued at timestamp
}

impl AccessTokenClaims {
    pub fn subject_id(&self) -> Option<CredentialId> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Signed bearer token plus its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of registration and federated sign-in
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub credential: Credential,
    pub access_token: AccessToken,
}

/// JWT claims proving a successful code check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationTicketClaims {
    pub sub: String, // Normalized identifier
    pub channel: IdentifierKind,
    pub purpose: VerificationPurpose,
    pub exp: i64,
    pub iat: i64,
}
