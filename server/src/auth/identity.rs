use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::StoreError;

/// The authenticated party a token pair belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    /// Normalized identity string (email or username).
    pub subject: String,
}

/// Data needed to create a principal. `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub subject: String,
    pub firstname: String,
    pub lastname: String,
    pub password_hash: String,
}

/// Stored identity with its credential hash.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub principal: Principal,
    pub password_hash: String,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a principal. Fails with `StoreError::Duplicate` if the subject
    /// is taken.
    async fn create(&self, identity: NewIdentity) -> Result<Principal, StoreError>;

    async fn find_by_subject(&self, subject: &str) -> Result<Option<IdentityRecord>, StoreError>;
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<MemoryIdentities>,
}

#[derive(Default)]
struct MemoryIdentities {
    next_id: i64,
    by_subject: HashMap<String, IdentityRecord>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create(&self, identity: NewIdentity) -> Result<Principal, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_subject.contains_key(&identity.subject) {
            return Err(StoreError::Duplicate);
        }
        inner.next_id += 1;
        let principal = Principal {
            user_id: inner.next_id,
            subject: identity.subject.clone(),
        };
        inner.by_subject.insert(
            identity.subject,
            IdentityRecord {
                principal: principal.clone(),
                password_hash: identity.password_hash,
            },
        );
        Ok(principal)
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.inner.read().await.by_subject.get(subject).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str) -> NewIdentity {
        NewIdentity {
            subject: subject.to_string(),
            firstname: String::new(),
            lastname: String::new(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let store = MemoryIdentityStore::new();
        assert_eq!(store.create(identity("a")).await.unwrap().user_id, 1);
        assert_eq!(store.create(identity("b")).await.unwrap().user_id, 2);
    }

    #[tokio::test]
    async fn duplicate_subject_rejected() {
        let store = MemoryIdentityStore::new();
        store.create(identity("u1")).await.unwrap();
        assert!(matches!(store.create(identity("u1")).await, Err(StoreError::Duplicate)));
    }

    #[tokio::test]
    async fn find_returns_hash() {
        let store = MemoryIdentityStore::new();
        store.create(identity("u1")).await.unwrap();
        let found = store.find_by_subject("u1").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "hash");
        assert_eq!(found.principal.subject, "u1");
        assert!(store.find_by_subject("u2").await.unwrap().is_none());
    }
}
