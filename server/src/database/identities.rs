use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::auth::identity::{IdentityRecord, IdentityStore, NewIdentity, Principal};
use crate::database::utils::get_timestamp;
use crate::database::StoreError;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    subject: String,
    password_hash: String,
}

/// `users` table
#[derive(Clone)]
pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn create(&self, identity: NewIdentity) -> Result<Principal, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (subject, firstname, lastname, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&identity.subject)
        .bind(&identity.firstname)
        .bind(&identity.lastname)
        .bind(&identity.password_hash)
        .bind(get_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Principal {
            user_id: result.last_insert_rowid(),
            subject: identity.subject,
        })
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, subject, password_hash FROM users WHERE subject = ?1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IdentityRecord {
            principal: Principal {
                user_id: r.id,
                subject: r.subject,
            },
            password_hash: r.password_hash,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect_in_memory;

    fn identity(subject: &str) -> NewIdentity {
        NewIdentity {
            subject: subject.to_string(),
            firstname: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            password_hash: "$argon2id$fake".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = SqliteIdentityStore::new(connect_in_memory().await.unwrap());
        let principal = store.create(identity("u1")).await.unwrap();
        assert!(principal.user_id > 0);

        let found = store.find_by_subject("u1").await.unwrap().unwrap();
        assert_eq!(found.principal, principal);
        assert_eq!(found.password_hash, "$argon2id$fake");
        assert!(store.find_by_subject("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_subject_maps_to_duplicate() {
        let store = SqliteIdentityStore::new(connect_in_memory().await.unwrap());
        store.create(identity("u1")).await.unwrap();
        assert!(matches!(store.create(identity("u1")).await, Err(StoreError::Duplicate)));
    }
}
