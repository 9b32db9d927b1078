//! SQLite-backed content store
//!
//! Implements every collaborator contract over one `SqlitePool` using the
//! tables created by `importer_common::db`. Writes go through
//! `retry_on_lock`, so lock contention is absorbed here and never reaches
//! the engine as a retry decision.

use super::{HoldingArea, LocaleCollaborator, MetadataStore, RecordStore, TaxonomyStore};
use crate::hooks::WriteStage;
use crate::types::{NewTerm, RecordBody, RecordId, RecordStatus, Term, TermId, TranslationGroup};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::Utc;
use importer_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

/// Default retry budget for locked writes
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid id '{}': {}", value, e)))
}

fn body_from_row(row: &SqliteRow) -> Result<RecordBody> {
    let status: String = row.try_get("status")?;
    let extra: String = row.try_get("extra")?;

    Ok(RecordBody {
        title: row.try_get("title")?,
        content: Some(row.try_get("content")?),
        excerpt: row.try_get("excerpt")?,
        status: Some(status.parse::<RecordStatus>().map_err(Error::Internal)?),
        record_type: Some(row.try_get("record_type")?),
        slug: row.try_get("slug")?,
        extra: serde_json::from_str(&extra)?,
    })
}

fn term_from_row(row: &SqliteRow) -> Result<Term> {
    let guid: String = row.try_get("guid")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;

    Ok(Term {
        id: parse_id(&guid)?,
        taxonomy: row.try_get("taxonomy")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        parent_id: parent_id.as_deref().map(parse_id).transpose()?,
    })
}

// ============================================================================
// Records, metadata, taxonomy, holding area
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_stage: WriteStage,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_stage: WriteStage::new(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Share an existing hook registry instead of the store's own
    pub fn with_write_stage(mut self, write_stage: WriteStage) -> Self {
        self.write_stage = write_stage;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count_records(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_terms(&self, taxonomy: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terms WHERE taxonomy = ?")
            .bind(taxonomy)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&self, body: &RecordBody) -> Result<RecordId> {
        let body = self.write_stage.apply(body.clone());
        let record_id = Uuid::new_v4();
        let guid = record_id.to_string();
        let extra = serde_json::to_string(&body.extra)?;

        retry_on_lock("create_record", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO records (guid, title, content, excerpt, status, record_type, slug, extra)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&guid)
            .bind(&body.title)
            .bind(body.content.as_deref().unwrap_or(""))
            .bind(&body.excerpt)
            .bind(body.status.unwrap_or_default().as_str())
            .bind(body.effective_type())
            .bind(&body.slug)
            .bind(&extra)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await?;

        Ok(record_id)
    }

    async fn update(&self, record_id: RecordId, body: &RecordBody) -> Result<()> {
        let body = self.write_stage.apply(body.clone());
        let guid = record_id.to_string();
        let extra = serde_json::to_string(&body.extra)?;

        let rows = retry_on_lock("update_record", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                UPDATE records
                SET title = ?, content = ?, excerpt = ?, status = ?, record_type = ?,
                    slug = ?, extra = ?, updated_at = CURRENT_TIMESTAMP
                WHERE guid = ?
                "#,
            )
            .bind(&body.title)
            .bind(body.content.as_deref().unwrap_or(""))
            .bind(&body.excerpt)
            .bind(body.status.unwrap_or_default().as_str())
            .bind(body.effective_type())
            .bind(&body.slug)
            .bind(&extra)
            .bind(&guid)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
        .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("Record {}", record_id)));
        }

        Ok(())
    }

    async fn get(&self, record_id: RecordId) -> Result<Option<RecordBody>> {
        let row = sqlx::query(
            r#"
            SELECT title, content, excerpt, status, record_type, slug, extra
            FROM records
            WHERE guid = ?
            "#,
        )
        .bind(record_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(body_from_row).transpose()
    }

    async fn find_by_index_key(&self, key: &str) -> Result<Vec<RecordId>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT record_id FROM record_meta WHERE meta_key = ? ORDER BY rowid")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;

        ids.iter().map(|id| parse_id(id)).collect()
    }

    fn write_stage(&self) -> Option<&WriteStage> {
        Some(&self.write_stage)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn set(&self, record_id: RecordId, key: &str, value: &serde_json::Value) -> Result<()> {
        let guid = record_id.to_string();
        let value = serde_json::to_string(value)?;

        retry_on_lock("set_meta", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO record_meta (record_id, meta_key, meta_value)
                VALUES (?, ?, ?)
                ON CONFLICT(record_id, meta_key) DO UPDATE SET
                    meta_value = excluded.meta_value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&guid)
            .bind(key)
            .bind(&value)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn get_value(&self, record_id: RecordId, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM record_meta WHERE record_id = ? AND meta_key = ?",
        )
        .bind(record_id.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TaxonomyStore for SqliteStore {
    async fn find_term(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>> {
        let row = sqlx::query(
            r#"
            SELECT guid, taxonomy, slug, name, description, parent_id
            FROM terms
            WHERE taxonomy = ? AND slug = ?
            "#,
        )
        .bind(taxonomy)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(term_from_row).transpose()
    }

    async fn create_term(&self, taxonomy: &str, term: &NewTerm) -> Result<Term> {
        let term_id = Uuid::new_v4();
        let guid = term_id.to_string();
        let parent_id = term.parent_id.map(|id| id.to_string());
        let what = format!("Term '{}' in taxonomy '{}'", term.slug, taxonomy);

        retry_on_lock("create_term", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO terms (guid, taxonomy, slug, name, description, parent_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&guid)
            .bind(taxonomy)
            .bind(&term.slug)
            .bind(&term.name)
            .bind(&term.description)
            .bind(&parent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::from_write(e, &what))?;

            Ok(())
        })
        .await?;

        Ok(Term {
            id: term_id,
            taxonomy: taxonomy.to_string(),
            slug: term.slug.clone(),
            name: term.name.clone(),
            description: term.description.clone(),
            parent_id: term.parent_id,
        })
    }

    async fn attach_term(&self, record_id: RecordId, term_id: TermId, taxonomy: &str) -> Result<()> {
        let record = record_id.to_string();
        let term = term_id.to_string();

        retry_on_lock("attach_term", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO record_terms (record_id, term_id, taxonomy)
                VALUES (?, ?, ?)
                ON CONFLICT(record_id, term_id) DO NOTHING
                "#,
            )
            .bind(&record)
            .bind(&term)
            .bind(taxonomy)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn terms_for_record(&self, record_id: RecordId, taxonomy: &str) -> Result<Vec<Term>> {
        let rows = sqlx::query(
            r#"
            SELECT t.guid, t.taxonomy, t.slug, t.name, t.description, t.parent_id
            FROM record_terms rt
            JOIN terms t ON t.guid = rt.term_id
            WHERE rt.record_id = ? AND rt.taxonomy = ?
            ORDER BY rt.rowid
            "#,
        )
        .bind(record_id.to_string())
        .bind(taxonomy)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(term_from_row).collect()
    }
}

#[async_trait]
impl HoldingArea for SqliteStore {
    async fn stash(&self, key: &str, snapshot: &serde_json::Value, ttl: Duration) -> Result<()> {
        let snapshot = serde_json::to_string(snapshot)?;
        let expires_at = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or_else(|| {
                Error::InvalidInput(format!("Holding TTL of {}s is out of range", ttl.as_secs()))
            })?;

        retry_on_lock("stash_snapshot", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO holding_area (key, snapshot, expires_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    snapshot = excluded.snapshot,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(key)
            .bind(&snapshot)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn fetch(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let snapshot: Option<String> = sqlx::query_scalar(
            "SELECT snapshot FROM holding_area WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        match snapshot {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Locale collaborator
// ============================================================================

/// Locale index and translation groups stored alongside the records
#[derive(Debug, Clone)]
pub struct SqliteTranslations {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteTranslations {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }
}

#[async_trait]
impl LocaleCollaborator for SqliteTranslations {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn set_record_locale(&self, record_id: RecordId, locale: &str) -> Result<()> {
        let guid = record_id.to_string();

        retry_on_lock("set_record_locale", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO record_locales (record_id, locale)
                VALUES (?, ?)
                ON CONFLICT(record_id) DO UPDATE SET locale = excluded.locale
                "#,
            )
            .bind(&guid)
            .bind(locale)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    async fn get_record_locale(&self, record_id: RecordId) -> Result<Option<String>> {
        let locale: Option<String> =
            sqlx::query_scalar("SELECT locale FROM record_locales WHERE record_id = ?")
                .bind(record_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(locale)
    }

    async fn get_translation_group(&self, anchor_id: RecordId) -> Result<TranslationGroup> {
        let guid = anchor_id.to_string();

        // The record may be the anchor itself or a member of another anchor's group
        let rows = sqlx::query(
            r#"
            SELECT locale, record_id
            FROM translation_groups
            WHERE anchor_id = (
                SELECT anchor_id FROM translation_groups
                WHERE anchor_id = ? OR record_id = ?
                ORDER BY anchor_id = ? DESC
                LIMIT 1
            )
            "#,
        )
        .bind(&guid)
        .bind(&guid)
        .bind(&guid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, RecordId)> {
                let locale: String = row.try_get("locale")?;
                let record_id: String = row.try_get("record_id")?;
                Ok((locale, parse_id(&record_id)?))
            })
            .collect()
    }

    async fn save_translation_group(
        &self,
        anchor_id: RecordId,
        group: &TranslationGroup,
    ) -> Result<()> {
        let anchor = anchor_id.to_string();
        let members: Vec<(String, String)> = group
            .iter()
            .map(|(locale, id)| (locale.to_string(), id.to_string()))
            .collect();

        retry_on_lock("save_translation_group", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM translation_groups WHERE anchor_id = ?")
                .bind(&anchor)
                .execute(&mut *tx)
                .await?;

            for (locale, record_id) in &members {
                // A record belongs to one group at a time
                sqlx::query("DELETE FROM translation_groups WHERE record_id = ?")
                    .bind(record_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    "INSERT INTO translation_groups (anchor_id, locale, record_id) VALUES (?, ?, ?)",
                )
                .bind(&anchor)
                .bind(locale)
                .bind(record_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
