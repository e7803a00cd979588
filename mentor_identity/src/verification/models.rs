//! Verification data models and tunables.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::models::UnknownVariant;
use crate::identifier::{Identifier, IdentifierKind};

/// Default lifetime of a pending verification
pub const DEFAULT_CODE_TTL: Duration = Duration::minutes(10);

/// Default number of wrong codes tolerated before a pending entry is dropped
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What a code is being requested for.
///
/// Pending entries for different purposes never collide, so a password reset
/// cannot be completed with a registration code and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    Registration,
    PasswordReset,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::Registration => "registration",
            VerificationPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for VerificationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Material needed to check a code later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PendingSecret {
    /// Hex SHA-256 of a locally generated code
    CodeHash(String),
    /// Handle of a code generated and held by an external provider
    ProviderReference(String),
}

/// An outstanding code challenge for one identifier and purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingVerification {
    /// Distinguishes successive requests for the same key
    pub nonce: Uuid,
    pub identifier: Identifier,
    pub purpose: VerificationPurpose,
    pub secret: PendingSecret,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub failed_attempts: u32,
}

impl PendingVerification {
    pub fn new(
        identifier: Identifier,
        purpose: VerificationPurpose,
        secret: PendingSecret,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            nonce: Uuid::new_v4(),
            identifier,
            purpose,
            secret,
            issued_at,
            expires_at: issued_at + ttl,
            failed_attempts: 0,
        }
    }

    /// A code is still valid at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn key(&self) -> String {
        pending_key(self.purpose, &self.identifier)
    }
}

/// Store key for a pending verification.
pub fn pending_key(purpose: VerificationPurpose, identifier: &Identifier) -> String {
    format!(
        "{}:{}:{}",
        purpose.as_str(),
        identifier.kind().as_str(),
        identifier.normalized()
    )
}

/// Proof that an identifier passed a code check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub identifier: Identifier,
    pub purpose: VerificationPurpose,
    pub verified_at: DateTime<Utc>,
}

/// Receipt returned to the caller after a code was sent.
#[derive(Debug, Clone, Serialize)]
pub struct CodeDispatch {
    pub channel: IdentifierKind,
    pub expires_at: DateTime<Utc>,
}

/// Whether a successful check removes the pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionPolicy {
    /// Single use: the entry is deleted on the first successful check
    ConsumeOnSuccess,
    /// The entry stays checkable until it expires
    RetainUntilExpiry,
}

impl FromStr for ConsumptionPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consume" => Ok(ConsumptionPolicy::ConsumeOnSuccess),
            "retain" => Ok(ConsumptionPolicy::RetainUntilExpiry),
            _ => Err(UnknownVariant {
                field: "consumption policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Broker tunables
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub code_ttl: Duration,
    /// Wrong codes tolerated per pending entry; 0 disables the limit
    pub max_attempts: u32,
    pub email_consumption: ConsumptionPolicy,
    pub phone_consumption: ConsumptionPolicy,
}

impl VerificationConfig {
    /// Load from environment variables, falling back to defaults
    ///
    /// - `VERIFICATION_CODE_TTL_SECS` (default: 600)
    /// - `VERIFICATION_MAX_ATTEMPTS` (default: 5)
    /// - `EMAIL_CODE_CONSUMPTION`: `consume` or `retain` (default: retain)
    /// - `PHONE_CODE_CONSUMPTION`: `consume` or `retain` (default: consume)
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            code_ttl: env::var("VERIFICATION_CODE_TTL_SECS")
                .ok()
                .and_then(|v| parse_or_warn::<i64>("VERIFICATION_CODE_TTL_SECS", &v))
                .map(Duration::seconds)
                .unwrap_or(defaults.code_ttl),
            max_attempts: env::var("VERIFICATION_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| parse_or_warn("VERIFICATION_MAX_ATTEMPTS", &v))
                .unwrap_or(defaults.max_attempts),
            email_consumption: env::var("EMAIL_CODE_CONSUMPTION")
                .ok()
                .and_then(|v| parse_or_warn("EMAIL_CODE_CONSUMPTION", &v))
                .unwrap_or(defaults.email_consumption),
            phone_consumption: env::var("PHONE_CODE_CONSUMPTION")
                .ok()
                .and_then(|v| parse_or_warn("PHONE_CODE_CONSUMPTION", &v))
                .unwrap_or(defaults.phone_consumption),
        }
    }

    pub fn consumption_for(&self, kind: IdentifierKind) -> ConsumptionPolicy {
        match kind {
            IdentifierKind::Email => self.email_consumption,
            IdentifierKind::Phone => self.phone_consumption,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl: DEFAULT_CODE_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            email_consumption: ConsumptionPolicy::RetainUntilExpiry,
            phone_consumption: ConsumptionPolicy::ConsumeOnSuccess,
        }
    }
}

fn parse_or_warn<T: FromStr>(var: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring invalid {}={:?}, using default", var, value);
            None
        }
    }
}
