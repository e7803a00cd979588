//! Access tokens and verification tickets.
//!
//! Both are HS256 JWTs signed with the same secret. Expiry is checked here
//! against an explicit `now` rather than by `jsonwebtoken`, so the boundary
//! is exact (no leeway) and the `*_at` variants are deterministic.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;

use super::errors::{AuthError, AuthResult};
use super::models::{AccessToken, AccessTokenClaims, Credential, VerificationTicketClaims};
use crate::identifier::classify;
use crate::verification::{Verified, VerificationPurpose};

/// Default access token lifetime
pub const ACCESS_TOKEN_TTL: Duration = Duration::hours(24);

/// Default verification ticket lifetime
pub const VERIFICATION_TICKET_TTL: Duration = Duration::minutes(10);

/// Mints and checks signed bearer tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_duration: Duration,
    ticket_duration: Duration,
}

impl TokenService {
    /// Create a token service
    ///
    /// # Arguments
    ///
    /// * `jwt_secret` - Secret key for JWT signing
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            access_token_duration: ACCESS_TOKEN_TTL,
            ticket_duration: VERIFICATION_TICKET_TTL,
        }
    }

    pub fn with_access_token_duration(mut self, duration: Duration) -> Self {
        self.access_token_duration = duration;
        self
    }

    pub fn with_ticket_duration(mut self, duration: Duration) -> Self {
        self.ticket_duration = duration;
        self
    }

    pub fn access_token_duration(&self) -> Duration {
        self.access_token_duration
    }

    pub fn ticket_duration(&self) -> Duration {
        self.ticket_duration
    }

    /// Mint an access token for a credential
    pub fn issue(&self, credential: &Credential) -> AuthResult<AccessToken> {
        self.issue_at(credential, Utc::now())
    }

    pub fn issue_at(&self, credential: &Credential, now: DateTime<Utc>) -> AuthResult<AccessToken> {
        let claims = AccessTokenClaims {
            sub: credential.id.to_string(),
            external_id: credential.external_id.clone(),
            is_admin: credential.is_admin,
            role: credential.role,
            exp: 0,
            iat: 0,
        };
        self.sign_access(claims, now)
    }

    /// Verify an access token
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenInvalid` - Malformed token or bad signature
    /// * `AuthError::TokenExpired` - Token past `exp`
    pub fn verify(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<AccessTokenClaims> {
        let claims: AccessTokenClaims = self.decode_claims(token)?;
        if now.timestamp() > claims.exp {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Re-sign a still valid token with a fresh expiry.
    ///
    /// Does not consult the credential store: subject, role and admin flag
    /// are carried over from the presented token.
    pub fn refresh(&self, token: &str) -> AuthResult<AccessToken> {
        self.refresh_at(token, Utc::now())
    }

    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<AccessToken> {
        let claims = self.verify_at(token, now)?;
        self.sign_access(claims, now)
    }

    /// Mint a ticket proving that `verified` passed a code check.
    pub fn issue_ticket(&self, verified: &Verified) -> AuthResult<String> {
        self.issue_ticket_at(verified, Utc::now())
    }

    pub fn issue_ticket_at(&self, verified: &Verified, now: DateTime<Utc>) -> AuthResult<String> {
        let claims = VerificationTicketClaims {
            sub: verified.identifier.normalized().to_string(),
            channel: verified.identifier.kind(),
            purpose: verified.purpose,
            iat: now.timestamp(),
            exp: (now + self.ticket_duration).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Redeem a ticket for the given purpose.
    ///
    /// Any defect (bad signature, expiry, wrong purpose) means the caller no
    /// longer holds a verified identifier, reported as
    /// `AuthError::InvalidOrExpiredCode`.
    pub fn verify_ticket(&self, ticket: &str, purpose: VerificationPurpose) -> AuthResult<Verified> {
        self.verify_ticket_at(ticket, purpose, Utc::now())
    }

    pub fn verify_ticket_at(
        &self,
        ticket: &str,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> AuthResult<Verified> {
        let claims: VerificationTicketClaims = self
            .decode_claims(ticket)
            .map_err(|_| AuthError::InvalidOrExpiredCode)?;

        if now.timestamp() > claims.exp || claims.purpose != purpose {
            return Err(AuthError::InvalidOrExpiredCode);
        }

        let identifier = classify(&claims.sub).map_err(|_| AuthError::InvalidOrExpiredCode)?;
        if identifier.kind() != claims.channel {
            return Err(AuthError::InvalidOrExpiredCode);
        }

        Ok(Verified {
            identifier,
            purpose: claims.purpose,
            verified_at: Utc
                .timestamp_opt(claims.iat, 0)
                .single()
                .unwrap_or(now),
        })
    }

    fn sign_access(&self, mut claims: AccessTokenClaims, now: DateTime<Utc>) -> AuthResult<AccessToken> {
        let expires_at = now + self.access_token_duration;
        claims.iat = now.timestamp();
        claims.exp = expires_at.timestamp();

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(AccessToken { token, expires_at })
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> AuthResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Role, SignInMethod};
    use uuid::Uuid;

    fn credential() -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            email: Some("mentor@example.com".to_string()),
            phone_number: None,
            password_hash: None,
            external_id: Some("uid-42".to_string()),
            display_name: None,
            is_verified: true,
            is_admin: true,
            provider: SignInMethod::Email,
            role: Role::Vvip,
            created_at: now,
            updated_at: now,
        }
    }

    fn service() -> TokenService {
        TokenService::new("test_secret_key_for_jwt_signing_0001")
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = service();
        let credential = credential();
        let token = tokens.issue(&credential).unwrap();
        let claims = tokens.verify(&token.token).unwrap();

        assert_eq!(claims.subject_id(), Some(credential.id));
        assert_eq!(claims.external_id.as_deref(), Some("uid-42"));
        assert!(claims.is_admin);
        assert_eq!(claims.role, Role::Vvip);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_expiry_boundary_is_exact() {
        let tokens = service();
        let issued = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let token = tokens.issue_at(&credential(), issued).unwrap();

        let at_expiry = issued + Duration::hours(24);
        assert!(tokens.verify_at(&token.token, at_expiry).is_ok());
        assert!(matches!(
            tokens.verify_at(&token.token, at_expiry + Duration::seconds(1)),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = service().issue(&credential()).unwrap();
        let other = TokenService::new("another_secret_key_for_jwt_signing_02");
        assert!(matches!(other.verify(&token.token), Err(AuthError::TokenInvalid)));
        assert!(matches!(service().verify("not-a-jwt"), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_refresh_keeps_subject_and_role() {
        let tokens = service();
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let original = tokens.issue_at(&credential(), issued).unwrap();

        let later = issued + Duration::hours(23);
        let refreshed = tokens.refresh_at(&original.token, later).unwrap();
        assert_eq!(refreshed.expires_at, later + Duration::hours(24));

        let old = tokens.verify_at(&original.token, later).unwrap();
        let new = tokens.verify_at(&refreshed.token, later).unwrap();
        assert_eq!(old.sub, new.sub);
        assert_eq!(old.role, new.role);
        assert_eq!(old.is_admin, new.is_admin);
        assert_eq!(new.iat, later.timestamp());
    }

    #[test]
    fn test_ticket_round_trip_and_purpose_check() {
        let tokens = service();
        let verified = Verified {
            identifier: classify("user@example.com").unwrap(),
            purpose: VerificationPurpose::Registration,
            verified_at: Utc::now(),
        };
        let ticket = tokens.issue_ticket(&verified).unwrap();

        let redeemed = tokens
            .verify_ticket(&ticket, VerificationPurpose::Registration)
            .unwrap();
        assert_eq!(redeemed.identifier.normalized(), "user@example.com");

        assert!(matches!(
            tokens.verify_ticket(&ticket, VerificationPurpose::PasswordReset),
            Err(AuthError::InvalidOrExpiredCode)
        ));
    }

    #[test]
    fn test_ticket_and_access_token_are_not_interchangeable() {
        let tokens = service();
        let access = tokens.issue(&credential()).unwrap();
        assert!(
            tokens
                .verify_ticket(&access.token, VerificationPurpose::Registration)
                .is_err()
        );

        let verified = Verified {
            identifier: classify("+15551234567").unwrap(),
            purpose: VerificationPurpose::Registration,
            verified_at: Utc::now(),
        };
        let ticket = tokens.issue_ticket(&verified).unwrap();
        assert!(matches!(tokens.verify(&ticket), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_ticket_expires() {
        let tokens = service();
        let issued = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let verified = Verified {
            identifier: classify("user@example.com").unwrap(),
            purpose: VerificationPurpose::PasswordReset,
            verified_at: issued,
        };
        let ticket = tokens.issue_ticket_at(&verified, issued).unwrap();
        assert!(
            tokens
                .verify_ticket_at(&ticket, VerificationPurpose::PasswordReset, issued + Duration::minutes(10))
                .is_ok()
        );
        assert!(
            tokens
                .verify_ticket_at(
                    &ticket,
                    VerificationPurpose::PasswordReset,
                    issued + Duration::minutes(10) + Duration::seconds(1)
                )
                .is_err()
        );
    }
}
