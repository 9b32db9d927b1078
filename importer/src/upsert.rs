//! Reconciliation and upsert engine
//!
//! One `save` call walks a unit through:
//!
//! 1. **Validate** every rule; an invalid unit is stashed in the holding
//!    area and rejected with its full error map. Nothing else is written.
//! 2. **Identify** the existing record (unless staging already did).
//! 3. **Persist** the body: create, or overlay onto the stored body and
//!    update. The engine's pre-save filters run on this body only, before
//!    the store's write stage. A failure here ends the call.
//! 4. **Tag** a created record with its identity index entries.
//! 5. **Write metadata**, last value per key.
//! 6. **Attach terms** per taxonomy.
//! 7. **Link locale** into the master's translation group.
//!
//! Steps 4-7 run after the body is committed; their failures become
//! warnings on the successful outcome.

use crate::error::{ImportError, ImportResult};
use crate::hooks::BodyFilter;
use crate::identity::IdentityResolver;
use crate::locale::{LinkOutcome, LinkWarning, LocaleLinkManager, MasterPolicy};
use crate::store::{ContentStore, LocaleCollaborator};
use crate::taxonomy::{ParentPolicy, TaxonomyResolver};
use crate::types::{ImportPayload, ImportUnit, MetaEntry, RecordId, Scope, TermAttachResult};
use crate::validators::Validator;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default holding area key prefix
pub const DEFAULT_HOLDING_KEY_PREFIX: &str = "gi_";

/// Default lifetime of a rejected snapshot (one day)
pub const DEFAULT_HOLDING_TTL: Duration = Duration::from_secs(86_400);

// ============================================================================
// Outcome types
// ============================================================================

/// Problem recorded after the record body was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveWarning {
    /// Identity tag, metadata or taxonomy write failed
    SecondaryWrite {
        scope: Scope,
        key: String,
        message: String,
    },
    Link(LinkWarning),
}

impl fmt::Display for SaveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveWarning::SecondaryWrite {
                scope,
                key,
                message,
            } => write!(f, "{}.{}: {}", scope, key, message),
            SaveWarning::Link(warning) => write!(f, "locale: {}", warning),
        }
    }
}

/// Result of a successful save
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub record_id: RecordId,
    /// True when this call created the record
    pub created: bool,
    pub warnings: Vec<SaveWarning>,
    pub term_results: Vec<TermAttachResult>,
    pub locale: LinkOutcome,
}

impl SaveOutcome {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct UpsertEngineBuilder<S: ContentStore> {
    store: Arc<S>,
    identity: IdentityResolver,
    validator: Option<Validator>,
    parent_policy: ParentPolicy,
    master_policy: MasterPolicy,
    locale_candidates: Vec<Arc<dyn LocaleCollaborator>>,
    pre_save: Vec<Arc<dyn BodyFilter>>,
    holding_key_prefix: String,
    holding_ttl: Duration,
}

impl<S: ContentStore> UpsertEngineBuilder<S> {
    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identity = IdentityResolver::new(prefix);
        self
    }

    /// Replace the default rule set
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn parent_policy(mut self, policy: ParentPolicy) -> Self {
        self.parent_policy = policy;
        self
    }

    pub fn master_policy(mut self, policy: MasterPolicy) -> Self {
        self.master_policy = policy;
        self
    }

    /// Add a locale collaborator candidate; earlier candidates take priority
    pub fn locale_collaborator(mut self, collaborator: Arc<dyn LocaleCollaborator>) -> Self {
        self.locale_candidates.push(collaborator);
        self
    }

    /// Filter applied to every body this engine writes
    pub fn pre_save_filter(mut self, filter: Arc<dyn BodyFilter>) -> Self {
        self.pre_save.push(filter);
        self
    }

    pub fn holding(mut self, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        self.holding_key_prefix = key_prefix.into();
        self.holding_ttl = ttl;
        self
    }

    pub fn build(self) -> UpsertEngine<S> {
        let validator = self
            .validator
            .unwrap_or_else(|| Validator::with_default_rules(&self.identity));
        let locales = LocaleLinkManager::detect(self.locale_candidates, self.identity.clone())
            .with_master_policy(self.master_policy);

        UpsertEngine {
            store: self.store,
            identity: self.identity,
            validator,
            taxonomy: TaxonomyResolver::new(self.parent_policy),
            locales,
            pre_save: self.pre_save,
            holding_key_prefix: self.holding_key_prefix,
            holding_ttl: self.holding_ttl,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct UpsertEngine<S: ContentStore> {
    store: Arc<S>,
    identity: IdentityResolver,
    validator: Validator,
    taxonomy: TaxonomyResolver,
    locales: LocaleLinkManager,
    pre_save: Vec<Arc<dyn BodyFilter>>,
    holding_key_prefix: String,
    holding_ttl: Duration,
}

impl<S: ContentStore> UpsertEngine<S> {
    pub fn builder(store: Arc<S>) -> UpsertEngineBuilder<S> {
        UpsertEngineBuilder {
            store,
            identity: IdentityResolver::default(),
            validator: None,
            parent_policy: ParentPolicy::default(),
            master_policy: MasterPolicy::default(),
            locale_candidates: Vec::new(),
            pre_save: Vec::new(),
            holding_key_prefix: DEFAULT_HOLDING_KEY_PREFIX.to_string(),
            holding_ttl: DEFAULT_HOLDING_TTL,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn locales(&self) -> &LocaleLinkManager {
        &self.locales
    }

    /// Holding area key for a rejected unit
    pub fn holding_key(&self, external_id: &str) -> String {
        format!("{}invalid_record_{}", self.holding_key_prefix, external_id)
    }

    /// Start a unit for `external_id`, resolving any existing record
    ///
    /// An empty id is recorded as an identity error without touching the
    /// store; `save` will reject the unit.
    pub async fn stage(&self, external_id: impl Into<String>) -> ImportResult<ImportUnit> {
        let mut unit = ImportUnit::new(external_id);

        if unit.external_id().is_empty() {
            unit.set_error(Scope::Identity, "external_id", "external id is required");
            return Ok(unit);
        }

        let existing = self
            .identity
            .resolve(self.store.as_ref(), unit.external_id())
            .await
            .map_err(ImportError::Persistence)?;
        unit.set_internal_id(existing);
        Ok(unit)
    }

    /// Stage a unit read from input, keeping its body, metadata, terms and locale
    pub async fn stage_payload(&self, payload: ImportPayload) -> ImportResult<ImportUnit> {
        let mut unit = self.stage(payload.external_id).await?;
        unit.body = payload.body;
        unit.metadata = payload.meta;
        unit.taxonomies = payload.taxonomies;
        unit.locale = payload.locale;
        Ok(unit)
    }

    pub async fn resolve(&self, external_id: &str) -> ImportResult<Option<RecordId>> {
        Ok(self.identity.resolve(self.store.as_ref(), external_id).await?)
    }

    /// Snapshot of a rejected unit, while it is still held
    pub async fn held_snapshot(&self, external_id: &str) -> ImportResult<Option<serde_json::Value>> {
        Ok(self.store.fetch(&self.holding_key(external_id)).await?)
    }

    /// Validate and write one unit
    pub async fn save(&self, unit: ImportUnit) -> ImportResult<SaveOutcome> {
        let mut unit = self.validator.validate(unit);
        if !unit.is_valid() {
            return Err(self.reject(&mut unit).await);
        }

        let external_id = unit.external_id().to_string();
        let existing = match unit.internal_id() {
            Some(id) => Some(id),
            None => self
                .identity
                .resolve(self.store.as_ref(), &external_id)
                .await
                .map_err(ImportError::Persistence)?,
        };

        let record_id = self.persist(&unit, existing).await.map_err(|e| {
            error!(external_id = %external_id, error = %e, "Record write failed");
            ImportError::Persistence(e)
        })?;
        unit.set_internal_id(Some(record_id));
        let created = existing.is_none();

        let mut warnings = Vec::new();

        if created {
            self.tag(record_id, &external_id, &mut warnings).await;
        }

        self.write_metadata(record_id, &unit.metadata, &mut warnings).await;

        let mut term_results = Vec::new();
        for (taxonomy, terms) in &unit.taxonomies {
            let results = self
                .taxonomy
                .resolve_and_attach(self.store.as_ref(), record_id, taxonomy, terms)
                .await;
            for failed in results.iter().filter(|r| !r.is_success()) {
                warnings.push(SaveWarning::SecondaryWrite {
                    scope: Scope::Taxonomy,
                    key: failed.name.clone(),
                    message: failed.error.clone().unwrap_or_else(|| "not attached".to_string()),
                });
            }
            term_results.extend(results);
        }

        let locale = self.link_locale(record_id, &unit, &mut warnings).await;

        if warnings.is_empty() {
            info!(external_id = %external_id, record_id = %record_id, created, "Record saved");
        } else {
            warn!(
                external_id = %external_id,
                record_id = %record_id,
                created,
                warnings = warnings.len(),
                "Record saved with warnings"
            );
        }

        Ok(SaveOutcome {
            record_id,
            created,
            warnings,
            term_results,
            locale,
        })
    }

    async fn reject(&self, unit: &mut ImportUnit) -> ImportError {
        let external_id = unit.external_id().to_string();
        warn!(
            external_id = %external_id,
            errors = unit.errors().len(),
            scopes = ?unit.errors().scopes(),
            "Unit rejected by validation"
        );

        // An unidentified unit has nowhere to be held
        if !external_id.is_empty() {
            let key = self.holding_key(&external_id);
            match serde_json::to_value(&*unit) {
                Ok(snapshot) => {
                    if let Err(e) = self.store.stash(&key, &snapshot, self.holding_ttl).await {
                        error!(external_id = %external_id, key = %key, error = %e, "Failed to hold rejected unit");
                    } else {
                        debug!(external_id = %external_id, key = %key, "Rejected unit held");
                    }
                }
                Err(e) => {
                    error!(external_id = %external_id, error = %e, "Failed to snapshot rejected unit")
                }
            }
        }

        ImportError::Validation(unit.take_errors())
    }

    async fn persist(
        &self,
        unit: &ImportUnit,
        existing: Option<RecordId>,
    ) -> importer_common::Result<RecordId> {
        let body = match existing {
            Some(record_id) => {
                let mut stored = self.store.get(record_id).await?.ok_or_else(|| {
                    importer_common::Error::NotFound(format!("Record {}", record_id))
                })?;
                stored.overlay(unit.body.clone());
                stored
            }
            None => unit.body.clone(),
        };

        // Engine filters touch only this call's body; the store's own write
        // stage still runs afterwards
        let body = self
            .pre_save
            .iter()
            .fold(body, |body, filter| filter.filter(body));

        match existing {
            Some(record_id) => {
                self.store.update(record_id, &body).await?;
                debug!(external_id = unit.external_id(), record_id = %record_id, "Record updated");
                Ok(record_id)
            }
            None => {
                let record_id = self.store.create(&body).await?;
                debug!(external_id = unit.external_id(), record_id = %record_id, "Record created");
                Ok(record_id)
            }
        }
    }

    async fn tag(&self, record_id: RecordId, external_id: &str, warnings: &mut Vec<SaveWarning>) {
        let value = serde_json::Value::String(external_id.to_string());
        let keys = [
            self.identity.base_key().to_string(),
            self.identity.index_key(external_id),
        ];

        for key in keys {
            if let Err(e) = self.store.set(record_id, &key, &value).await {
                error!(external_id, record_id = %record_id, key = %key, error = %e, "Identity tag write failed");
                warnings.push(SaveWarning::SecondaryWrite {
                    scope: Scope::Identity,
                    key,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn write_metadata(
        &self,
        record_id: RecordId,
        metadata: &[MetaEntry],
        warnings: &mut Vec<SaveWarning>,
    ) {
        for entry in collapse_metadata(metadata) {
            if let Err(e) = self.store.set(record_id, &entry.key, &entry.value).await {
                warn!(record_id = %record_id, key = %entry.key, error = %e, "Metadata write failed");
                warnings.push(SaveWarning::SecondaryWrite {
                    scope: Scope::Metadata,
                    key: entry.key.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn link_locale(
        &self,
        record_id: RecordId,
        unit: &ImportUnit,
        warnings: &mut Vec<SaveWarning>,
    ) -> LinkOutcome {
        match self
            .locales
            .link(self.store.as_ref(), record_id, unit.locale.as_ref())
            .await
        {
            Ok(LinkOutcome::NoCollaborator) => {
                let reason = self
                    .locales
                    .configuration_error()
                    .unwrap_or("no locale collaborator")
                    .to_string();
                debug!(record_id = %record_id, "Locale requested but no collaborator is active");
                warnings.push(SaveWarning::Link(LinkWarning::NoCollaborator { reason }));
                LinkOutcome::NoCollaborator
            }
            Ok(LinkOutcome::MasterPending { master_external_id }) => {
                warnings.push(SaveWarning::Link(LinkWarning::MasterUnresolved {
                    master_external_id: master_external_id.clone(),
                }));
                LinkOutcome::MasterPending { master_external_id }
            }
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(record_id = %record_id, error = %e, "Locale link failed");
                warnings.push(SaveWarning::Link(e.into()));
                LinkOutcome::LocaleSet
            }
        }
    }
}

/// Last value per key, in order of each key's first appearance
fn collapse_metadata(metadata: &[MetaEntry]) -> Vec<&MetaEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut collapsed: Vec<&MetaEntry> = Vec::new();

    for entry in metadata {
        match positions.get(entry.key.as_str()) {
            Some(&pos) => collapsed[pos] = entry,
            None => {
                positions.insert(entry.key.as_str(), collapsed.len());
                collapsed.push(entry);
            }
        }
    }

    collapsed
}

impl<S: ContentStore> fmt::Debug for UpsertEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpsertEngine")
            .field("identity", &self.identity)
            .field("validator", &self.validator)
            .field("taxonomy", &self.taxonomy)
            .field("locales", &self.locales)
            .field("pre_save", &self.pre_save.len())
            .finish()
    }
}
