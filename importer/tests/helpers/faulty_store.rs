//! Fault-injecting wrapper around `SqliteStore`
//!
//! Delegates every call to the real store, counts writes, and fails or lies
//! on demand.

use async_trait::async_trait;
use importer::hooks::WriteStage;
use importer::store::{HoldingArea, MetadataStore, RecordStore, SqliteStore, TaxonomyStore};
use importer::types::{NewTerm, RecordBody, RecordId, Term, TermId};
use importer_common::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Counters {
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub meta_writes: AtomicUsize,
    pub term_creates: AtomicUsize,
    pub attaches: AtomicUsize,
    pub stashes: AtomicUsize,
    pub index_lookups: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total writes of any kind, holding area excluded
    pub fn content_writes(&self) -> usize {
        Self::get(&self.creates)
            + Self::get(&self.updates)
            + Self::get(&self.meta_writes)
            + Self::get(&self.term_creates)
            + Self::get(&self.attaches)
    }
}

pub struct FaultyStore {
    pub inner: SqliteStore,
    pub counters: Counters,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_attach: AtomicBool,
    pub fail_stash: AtomicBool,
    /// Metadata keys whose writes fail
    pub fail_meta_keys: Mutex<HashSet<String>>,
    /// Number of upcoming `find_term` calls that report "not found"
    pub stale_term_lookups: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            counters: Counters::default(),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_attach: AtomicBool::new(false),
            fail_stash: AtomicBool::new(false),
            fail_meta_keys: Mutex::new(HashSet::new()),
            stale_term_lookups: AtomicUsize::new(0),
        }
    }

    pub fn fail_meta_key(&self, key: &str) {
        self.fail_meta_keys.lock().unwrap().insert(key.to_string());
    }

    fn injected(what: &str) -> Error {
        Error::Internal(format!("injected {} failure", what))
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn create(&self, body: &RecordBody) -> Result<RecordId> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::injected("create"));
        }
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(body).await
    }

    async fn update(&self, record_id: RecordId, body: &RecordBody) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Self::injected("update"));
        }
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(record_id, body).await
    }

    async fn get(&self, record_id: RecordId) -> Result<Option<RecordBody>> {
        RecordStore::get(&self.inner, record_id).await
    }

    async fn find_by_index_key(&self, key: &str) -> Result<Vec<RecordId>> {
        self.counters.index_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_index_key(key).await
    }

    fn write_stage(&self) -> Option<&WriteStage> {
        self.inner.write_stage()
    }
}

#[async_trait]
impl MetadataStore for FaultyStore {
    async fn set(&self, record_id: RecordId, key: &str, value: &serde_json::Value) -> Result<()> {
        if self.fail_meta_keys.lock().unwrap().contains(key) {
            return Err(Self::injected("metadata"));
        }
        self.counters.meta_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(record_id, key, value).await
    }

    async fn get_value(&self, record_id: RecordId, key: &str) -> Result<Option<serde_json::Value>> {
        self.inner.get_value(record_id, key).await
    }
}

#[async_trait]
impl TaxonomyStore for FaultyStore {
    async fn find_term(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>> {
        let stale = self
            .stale_term_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_term(taxonomy, slug).await
    }

    async fn create_term(&self, taxonomy: &str, term: &NewTerm) -> Result<Term> {
        self.counters.term_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_term(taxonomy, term).await
    }

    async fn attach_term(&self, record_id: RecordId, term_id: TermId, taxonomy: &str) -> Result<()> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(Self::injected("attach"));
        }
        self.counters.attaches.fetch_add(1, Ordering::SeqCst);
        self.inner.attach_term(record_id, term_id, taxonomy).await
    }

    async fn terms_for_record(&self, record_id: RecordId, taxonomy: &str) -> Result<Vec<Term>> {
        self.inner.terms_for_record(record_id, taxonomy).await
    }
}

#[async_trait]
impl HoldingArea for FaultyStore {
    async fn stash(&self, key: &str, snapshot: &serde_json::Value, ttl: Duration) -> Result<()> {
        if self.fail_stash.load(Ordering::SeqCst) {
            return Err(Self::injected("stash"));
        }
        self.counters.stashes.fetch_add(1, Ordering::SeqCst);
        self.inner.stash(key, snapshot, ttl).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.inner.fetch(key).await
    }
}
