//! Database initialization
//!
//! Opens (or creates) the importer database and creates every table the
//! content store collaborators rely on. All statements are idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL allows concurrent readers with one writer; settings apply to every pooled connection
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(250))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all importer tables on an open pool
///
/// Used by `init_database` and directly by tests running against
/// `sqlite::memory:`.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_records_table(pool).await?;
    create_record_meta_table(pool).await?;
    create_terms_table(pool).await?;
    create_record_terms_table(pool).await?;
    create_record_locales_table(pool).await?;
    create_translation_groups_table(pool).await?;
    create_holding_area_table(pool).await?;

    tracing::debug!("Importer schema ready");
    Ok(())
}

pub async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            excerpt TEXT,
            status TEXT NOT NULL,
            record_type TEXT NOT NULL,
            slug TEXT,
            extra TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Key/value metadata; also holds the external id index entries
pub async fn create_record_meta_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_meta (
            record_id TEXT NOT NULL REFERENCES records(guid) ON DELETE CASCADE,
            meta_key TEXT NOT NULL,
            meta_value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (record_id, meta_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_record_meta_key ON record_meta(meta_key)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_terms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS terms (
            guid TEXT PRIMARY KEY,
            taxonomy TEXT NOT NULL,
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            parent_id TEXT REFERENCES terms(guid) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (taxonomy, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_record_terms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_terms (
            record_id TEXT NOT NULL REFERENCES records(guid) ON DELETE CASCADE,
            term_id TEXT NOT NULL REFERENCES terms(guid) ON DELETE CASCADE,
            taxonomy TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (record_id, term_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_record_locales_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_locales (
            record_id TEXT PRIMARY KEY REFERENCES records(guid) ON DELETE CASCADE,
            locale TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (group anchor, locale)
pub async fn create_translation_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translation_groups (
            anchor_id TEXT NOT NULL,
            locale TEXT NOT NULL,
            record_id TEXT NOT NULL REFERENCES records(guid) ON DELETE CASCADE,
            PRIMARY KEY (anchor_id, locale)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_translation_groups_record ON translation_groups(record_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Time-bounded storage for rejected import snapshots
pub async fn create_holding_area_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS holding_area (
            key TEXT PRIMARY KEY,
            snapshot TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
