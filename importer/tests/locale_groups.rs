//! Translation group maintenance through the upsert engine
//!
//! Records arrive in any order; groups only ever grow, and a record is
//! listed under one locale at a time.

mod helpers;

use helpers::create_memory_pool;
use importer::config::{EngineSettings, LocaleCollaboratorKind};
use importer::locale::{LinkOutcome, LinkWarning, MasterPolicy};
use importer::store::{LocaleCollaborator, SqliteStore, SqliteTranslations};
use importer::types::{LocaleInfo, RecordBody, RecordId, TranslationGroup};
use importer::upsert::SaveWarning;
use importer::{sqlite_engine, ImportUnit, UpsertEngine};
use sqlx::SqlitePool;

async fn engine_with_pool(settings: &EngineSettings) -> (SqlitePool, UpsertEngine<SqliteStore>) {
    let pool = create_memory_pool().await;
    let engine = sqlite_engine(pool.clone(), settings);
    (pool, engine)
}

async fn save_localized(
    engine: &UpsertEngine<SqliteStore>,
    external_id: &str,
    locale: LocaleInfo,
) -> importer::SaveOutcome {
    engine
        .save(
            ImportUnit::new(external_id)
                .with_body(RecordBody::new(external_id))
                .with_locale(locale),
        )
        .await
        .expect("save should succeed")
}

fn group(entries: &[(&str, RecordId)]) -> TranslationGroup {
    entries
        .iter()
        .map(|(locale, id)| (locale.to_string(), *id))
        .collect()
}

#[tokio::test]
async fn test_group_grows_without_losing_entries() {
    let (pool, engine) = engine_with_pool(&EngineSettings::default()).await;
    let translations = SqliteTranslations::new(pool);

    let a = save_localized(&engine, "a", LocaleInfo::new("en")).await.record_id;
    let b = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a"))
        .await
        .record_id;

    assert_eq!(
        translations.get_translation_group(a).await.unwrap(),
        group(&[("en", a), ("fi", b)])
    );

    let c = save_localized(&engine, "c", LocaleInfo::new("sv").with_master("a"))
        .await
        .record_id;

    let expected = group(&[("en", a), ("fi", b), ("sv", c)]);
    assert_eq!(translations.get_translation_group(a).await.unwrap(), expected);
    // Every member sees the same group
    assert_eq!(translations.get_translation_group(c).await.unwrap(), expected);
}

#[tokio::test]
async fn test_master_given_as_full_index_key() {
    let (_pool, engine) = engine_with_pool(&EngineSettings::default()).await;

    let a = save_localized(&engine, "a", LocaleInfo::new("en")).await.record_id;
    let outcome = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("gi_a")).await;

    assert_eq!(
        outcome.locale,
        LinkOutcome::Linked {
            anchor: a,
            group: group(&[("en", a), ("fi", outcome.record_id)]),
        }
    );
}

#[tokio::test]
async fn test_relinking_is_idempotent() {
    let (pool, engine) = engine_with_pool(&EngineSettings::default()).await;
    let translations = SqliteTranslations::new(pool);

    let a = save_localized(&engine, "a", LocaleInfo::new("en")).await.record_id;
    let b = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a"))
        .await
        .record_id;
    let again = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a")).await;

    assert_eq!(again.record_id, b);
    assert!(!again.has_warnings());
    assert_eq!(
        translations.get_translation_group(a).await.unwrap(),
        group(&[("en", a), ("fi", b)])
    );
}

#[tokio::test]
async fn test_changed_locale_replaces_stale_entry() {
    let (pool, engine) = engine_with_pool(&EngineSettings::default()).await;
    let translations = SqliteTranslations::new(pool);

    let a = save_localized(&engine, "a", LocaleInfo::new("en")).await.record_id;
    let b = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a"))
        .await
        .record_id;
    save_localized(&engine, "b", LocaleInfo::new("sv").with_master("a")).await;

    assert_eq!(
        translations.get_translation_group(a).await.unwrap(),
        group(&[("en", a), ("sv", b)])
    );
    assert_eq!(translations.get_record_locale(b).await.unwrap().as_deref(), Some("sv"));
}

#[tokio::test]
async fn test_translation_before_master_links_on_resave() {
    let (pool, engine) = engine_with_pool(&EngineSettings::default()).await;
    let translations = SqliteTranslations::new(pool);

    let early = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a")).await;
    assert_eq!(
        early.warnings,
        vec![SaveWarning::Link(LinkWarning::MasterUnresolved {
            master_external_id: "a".to_string()
        })]
    );

    let a = save_localized(&engine, "a", LocaleInfo::new("en")).await.record_id;
    let b = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a"))
        .await
        .record_id;

    assert_eq!(
        translations.get_translation_group(a).await.unwrap(),
        group(&[("en", a), ("fi", b)])
    );
}

#[tokio::test]
async fn test_strict_master_policy_still_saves() {
    let settings = EngineSettings {
        master_policy: MasterPolicy::Strict,
        ..EngineSettings::default()
    };
    let (_pool, engine) = engine_with_pool(&settings).await;

    let outcome = save_localized(&engine, "b", LocaleInfo::new("fi").with_master("a")).await;

    assert!(outcome.created);
    assert_eq!(
        outcome.warnings,
        vec![SaveWarning::Link(LinkWarning::MasterUnresolved {
            master_external_id: "a".to_string()
        })]
    );
}

#[tokio::test]
async fn test_no_collaborator_is_a_warning_not_a_failure() {
    let settings = EngineSettings {
        locale_collaborator: LocaleCollaboratorKind::None,
        ..EngineSettings::default()
    };
    let (_pool, engine) = engine_with_pool(&settings).await;
    assert!(engine.locales().configuration_error().is_some());

    let outcome = save_localized(&engine, "a", LocaleInfo::new("en")).await;

    assert!(outcome.created);
    assert_eq!(outcome.locale, LinkOutcome::NoCollaborator);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [SaveWarning::Link(LinkWarning::NoCollaborator { .. })]
    ));

    // Units without locale information produce no locale warning
    let plain = engine
        .save(ImportUnit::new("b").with_body(RecordBody::new("b")))
        .await
        .unwrap();
    assert!(!plain.has_warnings());
}
