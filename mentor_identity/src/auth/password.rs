//! Password policy and Argon2id hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHasher as _, SaltString, rand_core::OsRng},
};

use super::errors::{AuthError, AuthResult};

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// An Argon2id PHC string, produced once per password change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Wrap a hash loaded from storage.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Validate password strength
///
/// At least [`MIN_PASSWORD_LENGTH`] characters and at least one digit.
pub fn validate_password_policy(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::PasswordPolicyViolation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::PasswordPolicyViolation(
            "Password must contain at least one number".to_string(),
        ));
    }

    Ok(())
}

/// Argon2id hasher with a server-side pepper
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> AuthResult<HashedPassword> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(HashedPassword(
            argon2
                .hash_password(peppered.as_bytes(), &salt)
                .map_err(|_| AuthError::HashingFailed)?
                .to_string(),
        ))
    }

    /// Verify password against hash
    #[cfg(test)]
    pub(crate) fn verify(&self, password: &str, hash: &HashedPassword) -> AuthResult<()> {
        use argon2::password_hash::{PasswordHash, PasswordVerifier};

        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash.as_str()).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}
