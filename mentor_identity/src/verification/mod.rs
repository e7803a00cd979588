//! One-time code verification for email and phone identifiers.
//!
//! The [`VerificationBroker`] owns pending challenges and dispatches to a
//! [`CodeProvider`] per [`crate::identifier::IdentifierKind`]. Adding a channel
//! means registering another provider.

pub mod broker;
pub mod email;
pub mod models;
pub mod provider;
pub mod sms;
pub mod store;

pub use broker::VerificationBroker;
pub use email::EmailCodeProvider;
pub use models::{
    CodeDispatch, ConsumptionPolicy, PendingSecret, PendingVerification, VerificationConfig,
    VerificationPurpose, Verified, pending_key,
};
pub use provider::{CodeProvider, ProviderError};
pub use sms::{TwilioConfig, TwilioVerifyProvider};
pub use store::{InMemoryVerificationStore, PgVerificationStore, VerificationStore};
