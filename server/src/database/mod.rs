pub mod create;
pub mod identities;
pub mod products;
pub mod tokens;
pub mod utils;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use shared::types::server_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

pub use create::create_tables;
pub use identities::SqliteIdentityStore;
pub use products::{CatalogError, ProductStore, SqliteProductStore};
pub use tokens::SqliteTokenStore;

/// Failure inside a store backend, shared by every store trait.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("record already exists")]
    Duplicate,

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

/// Open the SQLite pool described by `config` and create the schema.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database url {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    create_tables(&pool).await.context("Failed to create tables")?;
    info!("Database ready at {}", config.url);
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// The connection is pinned open; an in-memory SQLite database disappears
/// with its last connection.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory database url")?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")?;

    create_tables(&pool).await.context("Failed to create tables")?;
    Ok(pool)
}
