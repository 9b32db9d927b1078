//! Write-stage hooks
//!
//! A [`WriteStage`] is a store-wide registry of body filters that a record
//! store runs on every body immediately before the physical write. Whoever
//! owns the store installs filters for a bounded span: the returned
//! [`HookGuard`] removes them on drop, whether the writes in that span
//! succeeded or failed.
//!
//! Filters given to an engine are not registered here; the engine applies
//! them to its own body before handing it to the store.

use crate::types::RecordBody;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Transforms an outgoing record body
pub trait BodyFilter: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn filter(&self, body: RecordBody) -> RecordBody;
}

impl<F> BodyFilter for F
where
    F: Fn(RecordBody) -> RecordBody + Send + Sync,
{
    fn filter(&self, body: RecordBody) -> RecordBody {
        self(body)
    }
}

type Registered = (u64, Arc<dyn BodyFilter>);

/// Shared filter registry; clones refer to the same registry
#[derive(Clone, Default)]
pub struct WriteStage {
    filters: Arc<RwLock<Vec<Registered>>>,
    next_id: Arc<AtomicU64>,
}

impl WriteStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one filter until the guard is dropped
    pub fn install(&self, filter: Arc<dyn BodyFilter>) -> HookGuard {
        self.install_all(std::slice::from_ref(&filter))
    }

    /// Install filters (applied in slice order) until the guard is dropped
    pub fn install_all(&self, filters: &[Arc<dyn BodyFilter>]) -> HookGuard {
        let mut ids = Vec::with_capacity(filters.len());
        let mut registry = self.filters.write().unwrap_or_else(|e| e.into_inner());
        for filter in filters {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            debug!(hook = filter.name(), id, "Installing write-stage hook");
            registry.push((id, Arc::clone(filter)));
            ids.push(id);
        }

        HookGuard {
            stage: self.clone(),
            ids,
        }
    }

    /// Run every installed filter over `body`, in installation order
    pub fn apply(&self, body: RecordBody) -> RecordBody {
        let registry = self.filters.read().unwrap_or_else(|e| e.into_inner());
        registry
            .iter()
            .fold(body, |body, (_, filter)| filter.filter(body))
    }

    pub fn active_count(&self) -> usize {
        self.filters.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn remove(&self, ids: &[u64]) {
        let mut registry = self.filters.write().unwrap_or_else(|e| e.into_inner());
        registry.retain(|(id, _)| !ids.contains(id));
    }
}

impl std::fmt::Debug for WriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStage")
            .field("active", &self.active_count())
            .finish()
    }
}

/// Removes the filters it installed when dropped
#[must_use = "hooks are removed as soon as the guard is dropped"]
pub struct HookGuard {
    stage: WriteStage,
    ids: Vec<u64>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if !self.ids.is_empty() {
            debug!(count = self.ids.len(), "Removing write-stage hooks");
            self.stage.remove(&self.ids);
        }
    }
}
