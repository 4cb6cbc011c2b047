use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::auth::store::{TokenRecord, TokenState, TokenStore};
use crate::database::StoreError;

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    token_id: String,
    family_id: String,
    user_id: i64,
    state: String,
    issued_at: i64,
    expires_at: i64,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let state = TokenState::parse(&row.state)
            .ok_or_else(|| StoreError::Backend(format!("unknown token state '{}'", row.state)))?;
        Ok(TokenRecord {
            token_id: row.token_id,
            family_id: row.family_id,
            user_id: row.user_id,
            state,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }
}

/// `refresh_tokens` table
///
/// State changes are single `UPDATE ... WHERE state = ?` statements, so the
/// rows-affected count tells the caller whether it won.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop records that expired before `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn insert(&self, record: TokenRecord) -> Result<TokenState, StoreError> {
        // One statement, so a concurrent revoke_family lands either before the
        // EXISTS check or after the row is visible to its UPDATE.
        let stored: String = sqlx::query_scalar(
            "INSERT INTO refresh_tokens (token_id, family_id, user_id, state, issued_at, expires_at)
             SELECT ?1, ?2, ?3,
                    CASE WHEN EXISTS (
                        SELECT 1 FROM refresh_tokens WHERE family_id = ?2 AND state = 'revoked'
                    ) THEN 'revoked' ELSE ?4 END,
                    ?5, ?6
             RETURNING state",
        )
        .bind(&record.token_id)
        .bind(&record.family_id)
        .bind(record.user_id)
        .bind(record.state.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .fetch_one(&self.pool)
        .await?;
        TokenState::parse(&stored).ok_or_else(|| StoreError::Backend(format!("unknown token state '{stored}'")))
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        sqlx::query_as::<_, TokenRow>(
            "SELECT token_id, family_id, user_id, state, issued_at, expires_at
             FROM refresh_tokens WHERE token_id = ?1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?
        .map(TokenRecord::try_from)
        .transpose()
    }

    async fn transition(&self, token_id: &str, from: TokenState, to: TokenState) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE refresh_tokens SET state = ?1 WHERE token_id = ?2 AND state = ?3")
            .bind(to.as_str())
            .bind(token_id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET state = 'revoked' WHERE family_id = ?1 AND state != 'revoked'",
        )
        .bind(family_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn family_revoked(&self, family_id: &str) -> Result<bool, StoreError> {
        let revoked: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM refresh_tokens WHERE family_id = ?1 AND state = 'revoked' LIMIT 1",
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(revoked.is_some())
    }
}
