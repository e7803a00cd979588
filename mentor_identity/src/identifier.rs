//! Identifier classification.
//!
//! Every flow in this crate starts from a raw string typed by a user. The
//! classifier turns it into a tagged [`Identifier`] once, so the rest of the
//! code dispatches on [`IdentifierKind`] instead of re-inspecting strings.
//!
//! - Email: `local@domain.tld`, normalized to lowercase with surrounding
//!   whitespace removed.
//! - Phone: E.164 (`+` followed by 10 to 15 digits, first digit non-zero).
//!   A missing `+` is added and common separators are dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use regex::Regex;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static E164_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{9,14}$").expect("E.164 pattern is valid"));

/// Characters people type inside phone numbers that carry no meaning.
const PHONE_SEPARATORS: [char; 5] = [' ', '-', '.', '(', ')'];

/// The channel an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Email,
    Phone,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Email => "email",
            IdentifierKind::Phone => "phone",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string is neither an email address nor an E.164 number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is neither an email address nor a phone number")]
pub struct InvalidIdentifier(pub String);

/// A classified, normalized email address or phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    kind: IdentifierKind,
    raw: String,
    normalized: String,
}

impl Identifier {
    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The string exactly as the caller supplied it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical form used as the lookup key everywhere.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_email(&self) -> bool {
        self.kind == IdentifierKind::Email
    }

    pub fn is_phone(&self) -> bool {
        self.kind == IdentifierKind::Phone
    }

    /// Log-safe form: first letter and domain of an email, last two digits
    /// of a phone number.
    pub fn masked(&self) -> String {
        match self.kind {
            IdentifierKind::Email => match self.normalized.split_once('@') {
                Some((local, domain)) => {
                    let first = local.chars().next().unwrap_or('*');
                    format!("{first}***@{domain}")
                }
                None => "***".to_string(),
            },
            IdentifierKind::Phone => {
                let tail = self.normalized.len().saturating_sub(2);
                format!("***{}", &self.normalized[tail..])
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Classify a raw identifier.
///
/// # Errors
///
/// * [`InvalidIdentifier`] - the input matches neither pattern
///
/// # Example
///
/// ```
/// use mentor_identity::identifier::{classify, IdentifierKind};
///
/// let email = classify("  Trader@Example.COM ").unwrap();
/// assert_eq!(email.kind(), IdentifierKind::Email);
/// assert_eq!(email.normalized(), "trader@example.com");
///
/// let phone = classify("44 7911 123456").unwrap();
/// assert_eq!(phone.kind(), IdentifierKind::Phone);
/// assert_eq!(phone.normalized(), "+447911123456");
/// ```
pub fn classify(raw: &str) -> Result<Identifier, InvalidIdentifier> {
    let trimmed = raw.trim();

    if EMAIL_PATTERN.is_match(trimmed) {
        return Ok(Identifier {
            kind: IdentifierKind::Email,
            raw: raw.to_string(),
            normalized: trimmed.to_lowercase(),
        });
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !PHONE_SEPARATORS.contains(c))
        .collect();
    let candidate = if compact.starts_with('+') {
        compact
    } else {
        format!("+{compact}")
    };

    if E164_PATTERN.is_match(&candidate) {
        return Ok(Identifier {
            kind: IdentifierKind::Phone,
            raw: raw.to_string(),
            normalized: candidate,
        });
    }

    Err(InvalidIdentifier(raw.to_string()))
}
