//! Core data model for the import engine
//!
//! An [`ImportUnit`] is the staged, not-yet-validated record: body, ordered
//! metadata, taxonomy term references and optional locale information, plus
//! the scoped error map accumulated while staging and validating it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Internal identifier of a persisted record
pub type RecordId = Uuid;

/// Internal identifier of a taxonomy term
pub type TermId = Uuid;

// ============================================================================
// Error scopes
// ============================================================================

/// Named bucket for grouping related validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Identity,
    Body,
    Metadata,
    Taxonomy,
    Locale,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Identity => "identity",
            Scope::Body => "body",
            Scope::Metadata => "metadata",
            Scope::Taxonomy => "taxonomy",
            Scope::Locale => "locale",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error messages keyed by scope, then by field
///
/// Scopes are independent: writing into one never touches another. Within a
/// scope a later message for the same field replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopedErrors(BTreeMap<Scope, BTreeMap<String, String>>);

impl ScopedErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single field error under `scope`
    pub fn set(&mut self, scope: Scope, field: impl Into<String>, message: impl Into<String>) {
        self.0
            .entry(scope)
            .or_default()
            .insert(field.into(), message.into());
    }

    /// Merge every entry of `other` into `self`
    pub fn merge(&mut self, other: ScopedErrors) {
        for (scope, fields) in other.0 {
            self.0.entry(scope).or_default().extend(fields);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|fields| fields.is_empty())
    }

    /// Total number of field errors across all scopes
    pub fn len(&self) -> usize {
        self.0.values().map(|fields| fields.len()).sum()
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.0.get(&scope).is_some_and(|fields| !fields.is_empty())
    }

    pub fn scope(&self, scope: Scope) -> Option<&BTreeMap<String, String>> {
        self.0.get(&scope)
    }

    pub fn get(&self, scope: Scope, field: &str) -> Option<&str> {
        self.0
            .get(&scope)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
    }

    /// Scopes holding at least one error
    pub fn scopes(&self) -> Vec<Scope> {
        self.0
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(scope, _)| *scope)
            .collect()
    }

    /// Flattened `(scope, field, message)` view
    pub fn iter(&self) -> impl Iterator<Item = (Scope, &str, &str)> {
        self.0.iter().flat_map(|(scope, fields)| {
            fields
                .iter()
                .map(move |(field, message)| (*scope, field.as_str(), message.as_str()))
        })
    }
}

impl fmt::Display for ScopedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(scope, field, message)| format!("{}.{}: {}", scope, field, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

// ============================================================================
// Record body
// ============================================================================

/// Publication status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Draft,
    Publish,
    Pending,
    Private,
    Future,
    Trash,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Publish => "publish",
            RecordStatus::Pending => "pending",
            RecordStatus::Private => "private",
            RecordStatus::Future => "future",
            RecordStatus::Trash => "trash",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RecordStatus::Draft),
            "publish" => Ok(RecordStatus::Publish),
            "pending" => Ok(RecordStatus::Pending),
            "private" => Ok(RecordStatus::Private),
            "future" => Ok(RecordStatus::Future),
            "trash" => Ok(RecordStatus::Trash),
            other => Err(format!("Unknown record status '{}'", other)),
        }
    }
}

/// Default record type used when a body does not name one
pub const DEFAULT_RECORD_TYPE: &str = "post";

/// Flat record fields
///
/// Everything except the title is optional so that an update only replaces
/// what the incoming body actually carries. Unknown fields are kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBody {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RecordBody {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Record type, falling back to [`DEFAULT_RECORD_TYPE`]
    pub fn effective_type(&self) -> &str {
        self.record_type.as_deref().unwrap_or(DEFAULT_RECORD_TYPE)
    }

    /// Overlay `incoming` onto an existing body
    ///
    /// The title always comes from `incoming`; optional fields replace the
    /// stored value only when present; `extra` keys are merged.
    pub fn overlay(&mut self, incoming: RecordBody) {
        self.title = incoming.title;
        if incoming.content.is_some() {
            self.content = incoming.content;
        }
        if incoming.excerpt.is_some() {
            self.excerpt = incoming.excerpt;
        }
        if incoming.status.is_some() {
            self.status = incoming.status;
        }
        if incoming.record_type.is_some() {
            self.record_type = incoming.record_type;
        }
        if incoming.slug.is_some() {
            self.slug = incoming.slug;
        }
        self.extra.extend(incoming.extra);
    }
}

// ============================================================================
// Metadata, taxonomy and locale references
// ============================================================================

/// One metadata pair; duplicates are allowed, the last one wins at write time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reference to a taxonomy term by slug, created on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub name: String,
    pub slug: String,
    #[serde(default, alias = "parent", skip_serializing_if = "Option::is_none")]
    pub parent_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TermRef {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            parent_slug: None,
            description: None,
        }
    }

    pub fn with_parent(mut self, parent_slug: impl Into<String>) -> Self {
        self.parent_slug = Some(parent_slug.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A persisted taxonomy term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub taxonomy: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<TermId>,
}

/// Term creation request handed to the taxonomy store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTerm {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<TermId>,
}

/// Locale of the unit and, optionally, the external id of its master record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleInfo {
    pub locale: String,
    #[serde(default, alias = "master", skip_serializing_if = "Option::is_none")]
    pub master_external_id: Option<String>,
}

impl LocaleInfo {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            master_external_id: None,
        }
    }

    pub fn with_master(mut self, master_external_id: impl Into<String>) -> Self {
        self.master_external_id = Some(master_external_id.into());
        self
    }
}

/// Locale code → record id for one set of mutually translated records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslationGroup(BTreeMap<String, RecordId>);

impl TranslationGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locale: &str) -> Option<RecordId> {
        self.0.get(locale).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_record(&self, record_id: RecordId) -> bool {
        self.0.values().any(|id| *id == record_id)
    }

    /// Put `record_id` under `locale`, keeping every other entry
    ///
    /// Any other locale that pointed at the same record is dropped so a
    /// record is never listed twice. Returns true when the group changed.
    pub fn insert(&mut self, locale: impl Into<String>, record_id: RecordId) -> bool {
        let locale = locale.into();
        let before = self.0.clone();
        self.0.retain(|existing, id| *id != record_id || *existing == locale);
        self.0.insert(locale, record_id);
        before != self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.0.iter().map(|(locale, id)| (locale.as_str(), *id))
    }
}

impl FromIterator<(String, RecordId)> for TranslationGroup {
    fn from_iter<I: IntoIterator<Item = (String, RecordId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Import unit
// ============================================================================

/// Staged external record awaiting reconciliation
///
/// The external id is fixed at construction. A unit is valid iff its error
/// map is empty in every scope.
#[derive(Debug, Clone, Serialize)]
pub struct ImportUnit {
    external_id: String,
    internal_id: Option<RecordId>,
    pub body: RecordBody,
    pub metadata: Vec<MetaEntry>,
    pub taxonomies: BTreeMap<String, Vec<TermRef>>,
    pub locale: Option<LocaleInfo>,
    errors: ScopedErrors,
}

impl ImportUnit {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            internal_id: None,
            body: RecordBody::default(),
            metadata: Vec::new(),
            taxonomies: BTreeMap::new(),
            locale: None,
            errors: ScopedErrors::new(),
        }
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Internal id resolved during staging, if the record already exists
    pub fn internal_id(&self) -> Option<RecordId> {
        self.internal_id
    }

    pub(crate) fn set_internal_id(&mut self, record_id: Option<RecordId>) {
        self.internal_id = record_id;
    }

    pub fn with_body(mut self, body: RecordBody) -> Self {
        self.body = body;
        self
    }

    /// Append one metadata pair
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.push(MetaEntry::new(key, value));
        self
    }

    /// Append terms to `taxonomy`, keeping input order
    pub fn with_terms(mut self, taxonomy: impl Into<String>, terms: Vec<TermRef>) -> Self {
        self.taxonomies.entry(taxonomy.into()).or_default().extend(terms);
        self
    }

    pub fn with_locale(mut self, locale: LocaleInfo) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn errors(&self) -> &ScopedErrors {
        &self.errors
    }

    pub fn set_error(&mut self, scope: Scope, field: impl Into<String>, message: impl Into<String>) {
        self.errors.set(scope, field, message);
    }

    pub(crate) fn merge_errors(&mut self, errors: ScopedErrors) {
        self.errors.merge(errors);
    }

    pub(crate) fn take_errors(&mut self) -> ScopedErrors {
        std::mem::take(&mut self.errors)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Wire shape of an import unit, as read from JSON input
#[derive(Debug, Clone, Deserialize)]
pub struct ImportPayload {
    pub external_id: String,
    #[serde(default)]
    pub body: RecordBody,
    #[serde(default, alias = "metadata")]
    pub meta: Vec<MetaEntry>,
    #[serde(default)]
    pub taxonomies: BTreeMap<String, Vec<TermRef>>,
    #[serde(default, alias = "i18n")]
    pub locale: Option<LocaleInfo>,
}

impl From<ImportPayload> for ImportUnit {
    fn from(payload: ImportPayload) -> Self {
        let mut unit = ImportUnit::new(payload.external_id);
        unit.body = payload.body;
        unit.metadata = payload.meta;
        unit.taxonomies = payload.taxonomies;
        unit.locale = payload.locale;
        unit
    }
}

/// Per-term result of taxonomy resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermAttachResult {
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
    pub term_id: Option<TermId>,
    /// The term did not exist and was created by this call
    pub created: bool,
    pub attached: bool,
    pub error: Option<String>,
}

impl TermAttachResult {
    pub fn is_success(&self) -> bool {
        self.attached && self.error.is_none()
    }
}
