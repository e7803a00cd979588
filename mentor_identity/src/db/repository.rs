//! Credential repository trait and PostgreSQL implementation.
//!
//! The issuer and broker only see the trait, so tests and `--memory` runs
//! swap in [`super::InMemoryCredentialRepository`].

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::auth::models::{Credential, CredentialId, CredentialPatch, NewCredential};
use crate::auth::{AuthError, AuthResult};
use crate::identifier::{Identifier, IdentifierKind};

const CREDENTIAL_COLUMNS: &str = "id, email, phone_number, password_hash, external_id, display_name,
     is_verified, is_admin, provider, role, created_at, updated_at";

/// Trait for credential storage
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Find the credential owning a normalized email or phone number
    async fn find_by_identifier(&self, identifier: &Identifier) -> AuthResult<Option<Credential>>;

    /// Find credential by upstream subject id
    async fn find_by_subject_id(&self, external_id: &str) -> AuthResult<Option<Credential>>;

    /// Find credential by ID
    async fn find_by_id(&self, id: CredentialId) -> AuthResult<Option<Credential>>;

    /// Insert a credential
    ///
    /// Fails with `AuthError::DuplicateUser` when the email, phone number or
    /// subject id is already taken.
    async fn create(&self, credential: NewCredential) -> AuthResult<Credential>;

    /// Apply a partial update; `AuthError::UserNotFound` if the row is gone
    async fn update(&self, id: CredentialId, patch: CredentialPatch) -> AuthResult<Credential>;
}

/// Default PostgreSQL implementation of `CredentialRepository`
pub struct PgCredentialRepository {
    pool: PgPool,
}

impl PgCredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: &str,
    ) -> AuthResult<Option<Credential>> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| credential_from_row(&r)).transpose()
    }
}

fn credential_from_row(r: &PgRow) -> AuthResult<Credential> {
    let decode = |e: crate::auth::models::UnknownVariant| AuthError::Database(sqlx::Error::Decode(Box::new(e)));

    Ok(Credential {
        id: r.get("id"),
        email: r.get("email"),
        phone_number: r.get("phone_number"),
        password_hash: r.get("password_hash"),
        external_id: r.get("external_id"),
        display_name: r.get("display_name"),
        is_verified: r.get("is_verified"),
        is_admin: r.get("is_admin"),
        provider: r.get::<&str, _>("provider").parse().map_err(decode)?,
        role: r.get::<&str, _>("role").parse().map_err(decode)?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::DuplicateUser,
        _ => AuthError::Database(err),
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn find_by_identifier(&self, identifier: &Identifier) -> AuthResult<Option<Credential>> {
        let column = match identifier.kind() {
            IdentifierKind::Email => "email",
            IdentifierKind::Phone => "phone_number",
        };
        self.fetch_one_where(column, identifier.normalized()).await
    }

    async fn find_by_subject_id(&self, external_id: &str) -> AuthResult<Option<Credential>> {
        self.fetch_one_where("external_id", external_id).await
    }

    async fn find_by_id(&self, id: CredentialId) -> AuthResult<Option<Credential>> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| credential_from_row(&r)).transpose()
    }

    async fn create(&self, credential: NewCredential) -> AuthResult<Credential> {
        let row = sqlx::query(&format!(
            "INSERT INTO credentials
                 (id, email, phone_number, password_hash, external_id, display_name, provider)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(uuid::Uuid::new_v4())
        .bind(&credential.email)
        .bind(&credential.phone_number)
        .bind(&credential.password_hash)
        .bind(&credential.external_id)
        .bind(&credential.display_name)
        .bind(credential.provider.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        credential_from_row(&row)
    }

    async fn update(&self, id: CredentialId, patch: CredentialPatch) -> AuthResult<Credential> {
        let row = sqlx::query(&format!(
            "UPDATE credentials
             SET password_hash = COALESCE($2, password_hash),
                 display_name = COALESCE($3, display_name),
                 role = COALESCE($4, role),
                 external_id = COALESCE($5, external_id),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.password_hash)
        .bind(&patch.display_name)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(&patch.external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        match row {
            Some(r) => credential_from_row(&r),
            None => Err(AuthError::UserNotFound),
        }
    }
}
