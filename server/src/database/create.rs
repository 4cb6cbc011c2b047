use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version.  Bump this whenever the schema changes and add a
/// corresponding migration arm in `run_migrations`.
const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    create_schema(pool).await?;
    run_migrations(pool).await?;
    Ok(())
}

/// Create all tables for a brand-new database.
async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    // `subject` is the normalized identity (lowercased email or username).
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            subject       TEXT    NOT NULL UNIQUE,
            firstname     TEXT    NOT NULL DEFAULT '',
            lastname      TEXT    NOT NULL DEFAULT '',
            password_hash TEXT    NOT NULL,
            created_at    INTEGER NOT NULL
        )",
    )
    .execute(&mut *tx)
    .await?;

    // One row per issued refresh token. `family_id` is shared by every token
    // rotated out of the same login; `state` is 'valid', 'refreshed' or 'revoked'.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS refresh_tokens (
            token_id   TEXT    PRIMARY KEY,
            family_id  TEXT    NOT NULL,
            user_id    INTEGER NOT NULL,
            state      TEXT    NOT NULL DEFAULT 'valid',
            issued_at  INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
    )
    .execute(&mut *tx)
    .await?;

    // Optional attributes are nullable; colors / sizes are JSON arrays stored as text.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            img_src     TEXT,
            img_alt     TEXT,
            name        TEXT    NOT NULL,
            sales       INTEGER,
            stock       INTEGER,
            price       TEXT,
            rate_value  REAL,
            rate_count  INTEGER,
            categorie   TEXT,
            colors      TEXT    NOT NULL DEFAULT '[]',
            sizes       TEXT    NOT NULL DEFAULT '[]',
            description TEXT,
            details     TEXT
        )",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS product_images (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            src        TEXT    NOT NULL,
            alt        TEXT,
            FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
        )",
    )
    .execute(&mut *tx)
    .await?;

    // --- Indexes --------------------------------------------------------
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_tokens_family ON refresh_tokens(family_id)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user   ON refresh_tokens(user_id)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_product_images_prod   ON product_images(product_id)")
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

/// Apply any schema migrations required to reach `SCHEMA_VERSION`.
///
/// Uses `PRAGMA user_version` as the migration counter.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current_version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    if current_version > 0 {
        warn!(
            "Database schema at version {}; target version {}",
            current_version, SCHEMA_VERSION
        );
    }

    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    info!("Schema version set to {}.", SCHEMA_VERSION);
    Ok(())
}
