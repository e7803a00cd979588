//! Pending verification storage.
//!
//! Entries are keyed by [`super::pending_key`]. A `put` replaces any earlier
//! entry under the same key, which is how a fresh code request invalidates
//! the previous code. Each entry carries a nonce so that removal and failure
//! accounting only ever touch the entry the caller actually read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::PendingVerification;
use crate::auth::AuthResult;

/// Trait for pending verification storage
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert or replace the entry for `pending.key()`
    async fn put(&self, pending: &PendingVerification) -> AuthResult<()>;

    /// Fetch the entry under `key`, expired or not
    async fn get(&self, key: &str) -> AuthResult<Option<PendingVerification>>;

    /// Remove the entry under `key` unconditionally
    async fn delete(&self, key: &str) -> AuthResult<()>;

    /// Remove the entry under `key` only if it still carries `nonce`.
    ///
    /// Returns `true` for exactly one of any number of concurrent callers.
    async fn compare_and_delete(&self, key: &str, nonce: Uuid) -> AuthResult<bool>;

    /// Increment the failure counter of the entry carrying `nonce`.
    ///
    /// Returns the new count, or `None` when the entry is gone or replaced.
    async fn record_failure(&self, key: &str, nonce: Uuid) -> AuthResult<Option<u32>>;

    /// Drop every entry that expired before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// Process-local store for development and tests
#[derive(Default)]
pub struct InMemoryVerificationStore {
    entries: RwLock<HashMap<String, PendingVerification>>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn put(&self, pending: &PendingVerification) -> AuthResult<()> {
        self.entries
            .write()
            .await
            .insert(pending.key(), pending.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<PendingVerification>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, nonce: Uuid) -> AuthResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.nonce == nonce => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(&self, key: &str, nonce: Uuid) -> AuthResult<Option<u32>> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .get_mut(key)
            .filter(|entry| entry.nonce == nonce)
            .map(|entry| {
                entry.failed_attempts += 1;
                entry.failed_attempts
            }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }
}

/// PostgreSQL implementation of `VerificationStore`
///
/// The entry is stored as JSON next to the columns the store itself
/// filters on.
pub struct PgVerificationStore {
    pool: PgPool,
}

impl PgVerificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn put(&self, pending: &PendingVerification) -> AuthResult<()> {
        let payload = serde_json::to_string(pending)?;

        sqlx::query(
            "INSERT INTO pending_verifications (key, nonce, payload, failed_attempts, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (key) DO UPDATE
             SET nonce = EXCLUDED.nonce,
                 payload = EXCLUDED.payload,
                 failed_attempts = EXCLUDED.failed_attempts,
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(pending.key())
        .bind(pending.nonce)
        .bind(payload)
        .bind(pending.failed_attempts as i32)
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<PendingVerification>> {
        let row = sqlx::query(
            "SELECT payload, failed_attempts FROM pending_verifications WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let mut pending: PendingVerification =
                    serde_json::from_str(r.get::<&str, _>("payload"))?;
                pending.failed_attempts = r.get::<i32, _>("failed_attempts").max(0) as u32;
                Ok(Some(pending))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM pending_verifications WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, nonce: Uuid) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM pending_verifications WHERE key = $1 AND nonce = $2")
            .bind(key)
            .bind(nonce)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failure(&self, key: &str, nonce: Uuid) -> AuthResult<Option<u32>> {
        let row = sqlx::query(
            "UPDATE pending_verifications
             SET failed_attempts = failed_attempts + 1
             WHERE key = $1 AND nonce = $2
             RETURNING failed_attempts",
        )
        .bind(key)
        .bind(nonce)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<i32, _>("failed_attempts").max(0) as u32))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM pending_verifications WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::classify;
    use crate::verification::models::{DEFAULT_CODE_TTL, PendingSecret, VerificationPurpose};
    use std::sync::Arc;

    fn pending(raw: &str, issued_at: DateTime<Utc>) -> PendingVerification {
        PendingVerification::new(
            classify(raw).unwrap(),
            VerificationPurpose::Registration,
            PendingSecret::CodeHash("hash".into()),
            issued_at,
            DEFAULT_CODE_TTL,
        )
    }

    #[tokio::test]
    async fn test_put_replaces_previous_entry() {
        let store = InMemoryVerificationStore::new();
        let first = pending("a@b.co", Utc::now());
        let second = pending("a@b.co", Utc::now());

        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        let stored = store.get(&first.key()).await.unwrap().unwrap();
        assert_eq!(stored.nonce, second.nonce);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_compare_and_delete_checks_nonce() {
        let store = InMemoryVerificationStore::new();
        let entry = pending("a@b.co", Utc::now());
        store.put(&entry).await.unwrap();

        assert!(!store.compare_and_delete(&entry.key(), Uuid::new_v4()).await.unwrap());
        assert!(store.compare_and_delete(&entry.key(), entry.nonce).await.unwrap());
        assert!(!store.compare_and_delete(&entry.key(), entry.nonce).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_compare_and_delete_single_winner() {
        let store = Arc::new(InMemoryVerificationStore::new());
        let entry = pending("+15551234567", Utc::now());
        store.put(&entry).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let key = entry.key();
            let nonce = entry.nonce;
            handles.push(tokio::spawn(async move {
                store.compare_and_delete(&key, nonce).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_record_failure_counts() {
        let store = InMemoryVerificationStore::new();
        let entry = pending("a@b.co", Utc::now());
        store.put(&entry).await.unwrap();

        assert_eq!(store.record_failure(&entry.key(), entry.nonce).await.unwrap(), Some(1));
        assert_eq!(store.record_failure(&entry.key(), entry.nonce).await.unwrap(), Some(2));
        assert_eq!(store.record_failure(&entry.key(), Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(store.record_failure("missing", entry.nonce).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryVerificationStore::new();
        let now = Utc::now();
        store.put(&pending("old@b.co", now - chrono::Duration::minutes(11))).await.unwrap();
        store.put(&pending("new@b.co", now)).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}
