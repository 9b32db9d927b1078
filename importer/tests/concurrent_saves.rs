//! Integration tests for concurrent saves through one engine
//!
//! Saves for different external ids share a store and an engine; each save's
//! pre-save filters must touch only its own record body.

mod helpers;

use helpers::create_file_db;
use importer::store::{RecordStore, SqliteStore};
use importer::types::RecordBody;
use importer::{ImportUnit, UpsertEngine};
use std::sync::Arc;
use tokio::task::JoinSet;

const SAVES: usize = 24;

fn exclaim(mut body: RecordBody) -> RecordBody {
    body.title.push('!');
    body
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_apply_filters_once_per_body() {
    let (_temp_dir, pool) = create_file_db().await;
    let store = Arc::new(SqliteStore::new(pool));
    let engine = Arc::new(
        UpsertEngine::builder(Arc::clone(&store))
            .pre_save_filter(Arc::new(exclaim))
            .build(),
    );

    let mut join_set = JoinSet::new();
    for i in 0..SAVES {
        let engine = Arc::clone(&engine);
        join_set.spawn(async move {
            engine
                .save(ImportUnit::new(format!("ext-{}", i)).with_body(RecordBody::new("T")))
                .await
                .unwrap_or_else(|e| panic!("Save {} failed: {}", i, e))
        });
    }

    let mut titles = Vec::new();
    while let Some(result) = join_set.join_next().await {
        let outcome = result.expect("Task panicked");
        let stored = store.get(outcome.record_id).await.unwrap().unwrap();
        titles.push(stored.title);
    }

    assert_eq!(titles.len(), SAVES);
    assert!(
        titles.iter().all(|title| title == "T!"),
        "filters leaked between saves: {:?}",
        titles
    );
    assert_eq!(store.count_records().await.unwrap(), SAVES as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_stage_filters_apply_to_every_concurrent_save() {
    let (_temp_dir, pool) = create_file_db().await;
    let store = Arc::new(SqliteStore::new(pool));
    let _guard = store
        .write_stage()
        .map(|stage| stage.install(Arc::new(exclaim)))
        .expect("sqlite store has a write stage");
    let engine = Arc::new(UpsertEngine::builder(Arc::clone(&store)).build());

    let mut join_set = JoinSet::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        join_set.spawn(async move {
            engine
                .save(ImportUnit::new(format!("ext-{}", i)).with_body(RecordBody::new("T")))
                .await
                .unwrap_or_else(|e| panic!("Save {} failed: {}", i, e))
        });
    }

    while let Some(result) = join_set.join_next().await {
        let outcome = result.expect("Task panicked");
        assert_eq!(store.get(outcome.record_id).await.unwrap().unwrap().title, "T!");
    }
}
