//! Content importer library
//!
//! Reconciles externally-sourced records with a content store: external id
//! lookup, validation gating, taxonomy term resolution, metadata write-through
//! and translation group maintenance.

pub mod config;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod locale;
pub mod store;
pub mod taxonomy;
pub mod types;
pub mod upsert;
pub mod utils;
pub mod validators;

pub use crate::error::{ImportError, ImportResult};
pub use crate::types::{ImportPayload, ImportUnit, Scope, ScopedErrors};
pub use crate::upsert::{SaveOutcome, SaveWarning, UpsertEngine};

use crate::config::{EngineSettings, LocaleCollaboratorKind};
use crate::store::{SqliteStore, SqliteTranslations};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Engine over the SQLite store, configured from `settings`
pub fn sqlite_engine(pool: SqlitePool, settings: &EngineSettings) -> UpsertEngine<SqliteStore> {
    let store = SqliteStore::new(pool.clone()).with_max_lock_wait(settings.max_lock_wait_ms);

    let mut builder = UpsertEngine::builder(Arc::new(store))
        .id_prefix(settings.id_prefix.clone())
        .parent_policy(settings.parent_policy)
        .master_policy(settings.master_policy)
        .holding(settings.holding_key_prefix.clone(), settings.holding_ttl());

    if settings.locale_collaborator == LocaleCollaboratorKind::Sqlite {
        builder = builder.locale_collaborator(Arc::new(
            SqliteTranslations::new(pool).with_max_lock_wait(settings.max_lock_wait_ms),
        ));
    }

    builder.build()
}
