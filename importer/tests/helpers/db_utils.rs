//! Database Test Utilities

use importer::config::EngineSettings;
use importer::store::SqliteStore;
use importer::{sqlite_engine, UpsertEngine};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// In-memory database with the importer schema
///
/// Limited to one connection: every in-memory connection is its own database.
pub async fn create_memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    importer_common::db::create_schema(&pool)
        .await
        .expect("Schema initialization failed");
    pool
}

/// File-backed database in a temporary directory
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_file_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = importer_common::db::init_database(&temp_dir.path().join("test_importer.db"))
        .await
        .expect("Failed to initialize database");
    (temp_dir, pool)
}

/// Engine over a fresh in-memory store with default settings
pub async fn sqlite_test_engine() -> UpsertEngine<SqliteStore> {
    sqlite_engine(create_memory_pool().await, &EngineSettings::default())
}
