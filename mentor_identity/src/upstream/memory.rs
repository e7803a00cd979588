//! In-process identity provider for local development and tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FederatedIdentity, IdentityProvider, UpstreamAccount, UpstreamError};

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password_digest: String,
}

#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    federated_tokens: RwLock<HashMap<String, FederatedIdentity>>,
}

fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id_token` verify as `identity`.
    pub async fn register_federated_token(&self, id_token: impl Into<String>, identity: FederatedIdentity) {
        self.federated_tokens
            .write()
            .await
            .insert(id_token.into(), identity);
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UpstreamAccount, UpstreamError> {
        let email = email.to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(UpstreamError::EmailExists);
        }

        let uid = Uuid::new_v4().simple().to_string();
        accounts.insert(
            email.clone(),
            Account {
                uid: uid.clone(),
                email: email.clone(),
                password_digest: digest(password),
            },
        );

        Ok(UpstreamAccount {
            uid: uid.clone(),
            id_token: Some(format!("local-{uid}")),
            email: Some(email),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UpstreamAccount, UpstreamError> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email.to_lowercase())
            .filter(|a| a.password_digest == digest(password))
            .ok_or(UpstreamError::InvalidCredentials)?;

        Ok(UpstreamAccount {
            uid: account.uid.clone(),
            id_token: Some(format!("local-{}", account.uid)),
            email: Some(account.email.clone()),
        })
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<FederatedIdentity, UpstreamError> {
        self.federated_tokens
            .read()
            .await
            .get(id_token)
            .cloned()
            .ok_or_else(|| UpstreamError::InvalidToken("unknown token".to_string()))
    }

    async fn get_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UpstreamAccount>, UpstreamError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&email.to_lowercase())
            .map(|a| UpstreamAccount {
                uid: a.uid.clone(),
                id_token: None,
                email: Some(a.email.clone()),
            }))
    }

    async fn update_password(&self, uid: &str, new_password: &str) -> Result<(), UpstreamError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|a| a.uid == uid)
            .ok_or(UpstreamError::NotFound)?;
        account.password_digest = digest(new_password);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_sign_in() {
        let upstream = InMemoryIdentityProvider::new();
        let created = upstream.create_account("A@b.co", "Password123").await.unwrap();
        let signed_in = upstream.sign_in("a@b.co", "Password123").await.unwrap();
        assert_eq!(created.uid, signed_in.uid);

        assert!(matches!(
            upstream.sign_in("a@b.co", "wrong").await,
            Err(UpstreamError::InvalidCredentials)
        ));
        assert!(matches!(
            upstream.create_account("a@b.co", "Password123").await,
            Err(UpstreamError::EmailExists)
        ));
    }

    #[tokio::test]
    async fn test_update_password() {
        let upstream = InMemoryIdentityProvider::new();
        let account = upstream.create_account("a@b.co", "Password123").await.unwrap();
        upstream.update_password(&account.uid, "Changed456").await.unwrap();

        assert!(upstream.sign_in("a@b.co", "Password123").await.is_err());
        assert!(upstream.sign_in("a@b.co", "Changed456").await.is_ok());
        assert!(matches!(
            upstream.update_password("missing", "x").await,
            Err(UpstreamError::NotFound)
        ));
    }
}
