//! Credential issuance: password registration and login, federated sign-in,
//! password reset and access tokens.
//!
//! - Argon2id password hashing with server-side pepper
//! - HS256 JWT access tokens (24-hour expiry), refreshable while valid
//! - Short-lived verification tickets carrying a passed code check between
//!   requests
//!
//! ## Example
//!
//! ```no_run
//! use mentor_identity::auth::{CredentialIssuer, PasswordHasher, TokenService};
//! use mentor_identity::db::InMemoryCredentialRepository;
//! use mentor_identity::identifier::classify;
//! use mentor_identity::upstream::InMemoryIdentityProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let issuer = CredentialIssuer::new(
//!         Arc::new(InMemoryCredentialRepository::new()),
//!         Arc::new(InMemoryIdentityProvider::new()),
//!         PasswordHasher::new("pepper"),
//!         TokenService::new("jwt_secret_at_least_32_characters_long"),
//!     );
//!
//!     let email = classify("mentor@example.com")?;
//!     let issued = issuer
//!         .register_with_password(&email, "Password123", "Password123")
//!         .await?;
//!     println!("Registered credential {}", issued.credential.id);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod issuer;
pub mod models;
pub mod password;
pub mod tokens;

pub use errors::{AuthError, AuthResult};
pub use issuer::CredentialIssuer;
pub use models::{
    AccessToken, AccessTokenClaims, Credential, CredentialId, CredentialPatch, FederatedProvider,
    IssuedCredential, NewCredential, Role, SignInMethod,
};
pub use password::{HashedPassword, PasswordHasher, validate_password_policy};
pub use tokens::TokenService;
