//! Content store collaborator contracts
//!
//! The engine never talks to a database directly. It drives these traits,
//! one awaited call at a time; timeout and retry policy belong to the
//! implementation behind them.
//!
//! - [`RecordStore`]: record bodies and the external id index lookup
//! - [`MetadataStore`]: key/value metadata per record
//! - [`TaxonomyStore`]: terms and record/term associations
//! - [`HoldingArea`]: time-bounded snapshots of rejected units
//! - [`LocaleCollaborator`]: locale index and translation groups (0 or 1 active)

pub mod sqlite;

pub use sqlite::{SqliteStore, SqliteTranslations};

use crate::hooks::WriteStage;
use crate::types::{NewTerm, RecordBody, RecordId, Term, TermId, TranslationGroup};
use async_trait::async_trait;
use importer_common::Result;
use std::time::Duration;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its internal id
    async fn create(&self, body: &RecordBody) -> Result<RecordId>;

    /// Overwrite an existing record in place
    async fn update(&self, record_id: RecordId, body: &RecordBody) -> Result<()>;

    async fn get(&self, record_id: RecordId) -> Result<Option<RecordBody>>;

    /// Records carrying an index entry under `key`, oldest first
    async fn find_by_index_key(&self, key: &str) -> Result<Vec<RecordId>>;

    /// Hook registry applied to bodies right before `create`/`update` write
    fn write_stage(&self) -> Option<&WriteStage> {
        None
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the value stored under `key`
    async fn set(&self, record_id: RecordId, key: &str, value: &serde_json::Value) -> Result<()>;

    async fn get_value(&self, record_id: RecordId, key: &str) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn find_term(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>>;

    /// Create a term; a slug already taken in `taxonomy` yields `Error::Conflict`
    async fn create_term(&self, taxonomy: &str, term: &NewTerm) -> Result<Term>;

    /// Associate a term with a record; attaching twice is not an error
    async fn attach_term(&self, record_id: RecordId, term_id: TermId, taxonomy: &str) -> Result<()>;

    async fn terms_for_record(&self, record_id: RecordId, taxonomy: &str) -> Result<Vec<Term>>;
}

#[async_trait]
pub trait HoldingArea: Send + Sync {
    async fn stash(&self, key: &str, snapshot: &serde_json::Value, ttl: Duration) -> Result<()>;

    /// Fetch a snapshot that has not yet expired
    async fn fetch(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

/// Everything the upsert engine needs from one backing store
pub trait ContentStore: RecordStore + MetadataStore + TaxonomyStore + HoldingArea {}

impl<T> ContentStore for T where T: RecordStore + MetadataStore + TaxonomyStore + HoldingArea {}

/// Translation adapter: locale index plus translation groups
#[async_trait]
pub trait LocaleCollaborator: Send + Sync {
    /// Adapter identifier for diagnostics (e.g. "sqlite")
    fn name(&self) -> &'static str;

    /// Whether the adapter can serve requests in this deployment
    fn is_available(&self) -> bool {
        true
    }

    async fn set_record_locale(&self, record_id: RecordId, locale: &str) -> Result<()>;

    async fn get_record_locale(&self, record_id: RecordId) -> Result<Option<String>>;

    /// Group containing `anchor_id`, empty when it belongs to none
    async fn get_translation_group(&self, anchor_id: RecordId) -> Result<TranslationGroup>;

    /// Replace the group anchored at `anchor_id` with `group`
    async fn save_translation_group(&self, anchor_id: RecordId, group: &TranslationGroup)
        -> Result<()>;
}
