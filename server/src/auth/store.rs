use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::StoreError;

/// Lifecycle state of one refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    Refreshed,
    Revoked,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenState::Valid => "valid",
            TokenState::Refreshed => "refreshed",
            TokenState::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(TokenState::Valid),
            "refreshed" => Some(TokenState::Refreshed),
            "revoked" => Some(TokenState::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side record of an issued refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token_id: String,
    pub family_id: String,
    pub user_id: i64,
    pub state: TokenState,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Persistence for refresh-token records.
///
/// `transition` is a compare-and-set: it succeeds for exactly one caller per
/// `(token_id, from)` pair, however many race.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a new record and return the state it was stored in. A record
    /// joining a family that already has a revoked member is stored revoked,
    /// in the same step as the membership check.
    async fn insert(&self, record: TokenRecord) -> Result<TokenState, StoreError>;

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Move `token_id` from `from` to `to`. Returns false if the record is
    /// missing or not currently in `from`.
    async fn transition(&self, token_id: &str, from: TokenState, to: TokenState) -> Result<bool, StoreError>;

    /// Revoke every record of a family. Returns the number of records changed.
    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError>;

    /// True once any record of the family has been revoked.
    async fn family_revoked(&self, family_id: &str) -> Result<bool, StoreError>;
}

/// In-process token store
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record, in no particular order.
    pub async fn snapshot(&self) -> Vec<TokenRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, mut record: TokenRecord) -> Result<TokenState, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.token_id) {
            return Err(StoreError::Duplicate);
        }
        if records
            .values()
            .any(|r| r.family_id == record.family_id && r.state == TokenState::Revoked)
        {
            record.state = TokenState::Revoked;
        }
        let state = record.state;
        records.insert(record.token_id.clone(), record);
        Ok(state)
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.records.read().await.get(token_id).cloned())
    }

    async fn transition(&self, token_id: &str, from: TokenState, to: TokenState) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(token_id) {
            Some(record) if record.state == from => {
                record.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records.values_mut() {
            if record.family_id == family_id && record.state != TokenState::Revoked {
                record.state = TokenState::Revoked;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn family_revoked(&self, family_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .any(|r| r.family_id == family_id && r.state == TokenState::Revoked))
    }
}
