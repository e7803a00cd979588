//! In-memory credential repository for development and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::CredentialRepository;
use crate::auth::models::{Credential, CredentialId, CredentialPatch, NewCredential};
use crate::auth::{AuthError, AuthResult};
use crate::identifier::{Identifier, IdentifierKind};

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: RwLock<HashMap<CredentialId, Credential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

fn same(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn find_by_identifier(&self, identifier: &Identifier) -> AuthResult<Option<Credential>> {
        let credentials = self.credentials.read().await;
        let wanted = Some(identifier.normalized().to_string());

        Ok(credentials
            .values()
            .find(|c| match identifier.kind() {
                IdentifierKind::Email => same(&c.email, &wanted),
                IdentifierKind::Phone => same(&c.phone_number, &wanted),
            })
            .cloned())
    }

    async fn find_by_subject_id(&self, external_id: &str) -> AuthResult<Option<Credential>> {
        Ok(self
            .credentials
            .read()
            .await
            .values()
            .find(|c| c.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_id(&self, id: CredentialId) -> AuthResult<Option<Credential>> {
        Ok(self.credentials.read().await.get(&id).cloned())
    }

    async fn create(&self, credential: NewCredential) -> AuthResult<Credential> {
        let mut credentials = self.credentials.write().await;

        let taken = credentials.values().any(|c| {
            same(&c.email, &credential.email)
                || same(&c.phone_number, &credential.phone_number)
                || same(&c.external_id, &credential.external_id)
        });
        if taken {
            return Err(AuthError::DuplicateUser);
        }

        let created = credential.into_credential(Uuid::new_v4(), Utc::now());
        credentials.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: CredentialId, patch: CredentialPatch) -> AuthResult<Credential> {
        let mut credentials = self.credentials.write().await;

        if patch.external_id.is_some()
            && credentials
                .values()
                .any(|c| c.id != id && same(&c.external_id, &patch.external_id))
        {
            return Err(AuthError::DuplicateUser);
        }

        let credential = credentials.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        patch.apply(credential, Utc::now());
        Ok(credential.clone())
    }
}
