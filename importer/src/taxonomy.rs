//! Taxonomy term resolution and attachment
//!
//! Terms are processed one at a time in input order: reuse the term with the
//! same slug if it exists, otherwise create it (under its parent when that
//! resolves), then attach it to the record. Each term succeeds or fails on
//! its own; nothing is rolled back when a later term fails.

use crate::store::TaxonomyStore;
use crate::types::{NewTerm, RecordId, Term, TermAttachResult, TermId, TermRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single term was not resolved or attached
#[derive(Debug, Error)]
pub enum TermError {
    #[error("lookup failed: {0}")]
    Lookup(#[source] importer_common::Error),

    #[error("parent lookup failed: {0}")]
    ParentLookup(#[source] importer_common::Error),

    #[error("parent term '{0}' not found")]
    ParentMissing(String),

    #[error("create failed: {0}")]
    Create(#[source] importer_common::Error),

    #[error("term '{0}' conflicted but could not be found")]
    ConflictUnresolved(String),

    #[error("attach failed: {0}")]
    Attach(#[source] importer_common::Error),
}

/// Handling of a parent slug that does not resolve to an existing term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentPolicy {
    /// Create the term at root level
    #[default]
    Lenient,
    /// Fail that term and leave it unattached
    Strict,
}

impl std::str::FromStr for ParentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(ParentPolicy::Lenient),
            "strict" => Ok(ParentPolicy::Strict),
            other => Err(format!("Unknown parent policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaxonomyResolver {
    parent_policy: ParentPolicy,
}

impl TaxonomyResolver {
    pub fn new(parent_policy: ParentPolicy) -> Self {
        Self { parent_policy }
    }

    pub fn parent_policy(&self) -> ParentPolicy {
        self.parent_policy
    }

    /// Find or create every term in `terms` and attach it to `record_id`
    ///
    /// Returns one result per input term, in input order.
    pub async fn resolve_and_attach<S>(
        &self,
        store: &S,
        record_id: RecordId,
        taxonomy: &str,
        terms: &[TermRef],
    ) -> Vec<TermAttachResult>
    where
        S: TaxonomyStore + ?Sized,
    {
        let mut results = Vec::with_capacity(terms.len());

        for term in terms {
            let mut result = TermAttachResult {
                taxonomy: taxonomy.to_string(),
                name: term.name.clone(),
                slug: term.slug.clone(),
                term_id: None,
                created: false,
                attached: false,
                error: None,
            };

            match self.find_or_create(store, taxonomy, term).await {
                Ok((resolved, created)) => {
                    result.term_id = Some(resolved.id);
                    result.created = created;

                    match store.attach_term(record_id, resolved.id, taxonomy).await {
                        Ok(()) => {
                            result.attached = true;
                            debug!(taxonomy, slug = %term.slug, record_id = %record_id, "Term attached");
                        }
                        Err(e) => {
                            let e = TermError::Attach(e);
                            warn!(taxonomy, slug = %term.slug, error = %e, "Term attach failed");
                            result.error = Some(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(taxonomy, slug = %term.slug, error = %e, "Term not resolved");
                    result.error = Some(e.to_string());
                }
            }

            results.push(result);
        }

        results
    }

    async fn find_or_create<S>(
        &self,
        store: &S,
        taxonomy: &str,
        term: &TermRef,
    ) -> Result<(Term, bool), TermError>
    where
        S: TaxonomyStore + ?Sized,
    {
        if let Some(existing) = store
            .find_term(taxonomy, &term.slug)
            .await
            .map_err(TermError::Lookup)?
        {
            return Ok((existing, false));
        }

        let parent_id = self.resolve_parent(store, taxonomy, term).await?;
        let new_term = NewTerm {
            name: term.name.clone(),
            slug: term.slug.clone(),
            description: term.description.clone(),
            parent_id,
        };

        match store.create_term(taxonomy, &new_term).await {
            Ok(created) => {
                info!(taxonomy, slug = %created.slug, term_id = %created.id, "Created term");
                Ok((created, true))
            }
            Err(importer_common::Error::Conflict(_)) => {
                // Lost a creation race; the winner's term is the one to use
                debug!(taxonomy, slug = %term.slug, "Term created concurrently, re-fetching");
                store
                    .find_term(taxonomy, &term.slug)
                    .await
                    .map_err(TermError::Lookup)?
                    .map(|existing| (existing, false))
                    .ok_or_else(|| TermError::ConflictUnresolved(term.slug.clone()))
            }
            Err(e) => Err(TermError::Create(e)),
        }
    }

    async fn resolve_parent<S>(
        &self,
        store: &S,
        taxonomy: &str,
        term: &TermRef,
    ) -> Result<Option<TermId>, TermError>
    where
        S: TaxonomyStore + ?Sized,
    {
        let Some(parent_slug) = term.parent_slug.as_deref() else {
            return Ok(None);
        };

        let parent = store
            .find_term(taxonomy, parent_slug)
            .await
            .map_err(TermError::ParentLookup)?;

        match (parent, self.parent_policy) {
            (Some(parent), _) => Ok(Some(parent.id)),
            (None, ParentPolicy::Lenient) => {
                warn!(taxonomy, slug = %term.slug, parent = parent_slug, "Parent term not found, creating at root");
                Ok(None)
            }
            (None, ParentPolicy::Strict) => Err(TermError::ParentMissing(parent_slug.to_string())),
        }
    }
}
