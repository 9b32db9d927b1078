//! External id → internal record id resolution
//!
//! Every created record carries two index entries: a base key shared by all
//! imported records (the prefix without its trailing separator) and a
//! fully-qualified key `{prefix}{external_id}` unique to one external id.
//! Only the fully-qualified key is used for lookups.

use crate::store::RecordStore;
use crate::types::RecordId;
use importer_common::Result;
use tracing::{debug, warn};

/// Default identity index prefix
pub const DEFAULT_ID_PREFIX: &str = "gi_";

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    prefix: String,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ID_PREFIX)
    }
}

impl IdentityResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Collision-prone key shared by every imported record
    pub fn base_key(&self) -> &str {
        self.prefix.trim_end_matches('_')
    }

    /// Authoritative lookup key for one external id
    pub fn index_key(&self, external_id: &str) -> String {
        format!("{}{}", self.prefix, external_id)
    }

    /// Strip the index prefix from a reference given as a full query key
    ///
    /// References without the prefix are returned unchanged.
    pub fn strip_prefix<'a>(&self, reference: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return reference;
        }
        reference.strip_prefix(self.prefix.as_str()).unwrap_or(reference)
    }

    /// Look up the record indexed under `external_id`
    ///
    /// When the index holds several records for the same key the oldest one
    /// wins; duplicates are reported but never fail the lookup.
    pub async fn resolve<S>(&self, store: &S, external_id: &str) -> Result<Option<RecordId>>
    where
        S: RecordStore + ?Sized,
    {
        let key = self.index_key(external_id);
        let matches = store.find_by_index_key(&key).await?;

        if matches.len() > 1 {
            warn!(
                external_id,
                count = matches.len(),
                record_id = %matches[0],
                "Duplicate identity index entries, using the first match"
            );
        }

        let found = matches.first().copied();
        debug!(external_id, found = ?found, "Resolved external id");
        Ok(found)
    }
}
