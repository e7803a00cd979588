//! # Mentor Identity
//!
//! Sign-up, sign-in and password recovery for the mentorship platform.
//!
//! A request flows through three stages:
//!
//! 1. [`identifier::classify`] turns the raw string a user typed into an
//!    email address or an E.164 phone number.
//! 2. The [`verification::VerificationBroker`] sends a one-time code over
//!    the identifier's channel and checks it.
//! 3. The [`auth::CredentialIssuer`] creates or locates the credential and
//!    mints an access token.
//!
//! Storage, code delivery and the upstream identity provider sit behind
//! traits with PostgreSQL/HTTP implementations for production and
//! in-memory ones for development and tests.
//!
//! ## Example
//!
//! ```
//! use mentor_identity::identifier::{classify, IdentifierKind};
//!
//! let id = classify("+44 7911 123456").unwrap();
//! assert_eq!(id.kind(), IdentifierKind::Phone);
//! ```

/// Credential issuance and access tokens.
pub mod auth;

/// Credential storage.
pub mod db;

/// Outbound email.
pub mod email;

/// Identifier classification.
pub mod identifier;

/// Upstream identity provider.
pub mod upstream;

/// One-time code verification.
pub mod verification;

pub use auth::{AuthError, AuthResult, CredentialIssuer, TokenService};
pub use identifier::{Identifier, IdentifierKind, classify};
pub use verification::VerificationBroker;
