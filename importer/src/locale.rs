//! Locale tagging and translation group maintenance
//!
//! The manager holds at most one [`LocaleCollaborator`], chosen once at
//! construction. Linking never blocks a save: every problem is reported to
//! the caller as a [`LinkError`] or a non-linking [`LinkOutcome`], which the
//! engine turns into warnings.

use crate::identity::IdentityResolver;
use crate::store::{LocaleCollaborator, RecordStore};
use crate::types::{LocaleInfo, RecordId, TranslationGroup};
use crate::validators::locale::is_valid_locale;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Handling of a master reference that does not resolve yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterPolicy {
    /// Tag the locale and wait for the master to arrive
    #[default]
    Lenient,
    /// Report the missing master as a link error
    Strict,
}

impl std::str::FromStr for MasterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(MasterPolicy::Lenient),
            "strict" => Ok(MasterPolicy::Strict),
            other => Err(format!("Unknown master policy '{}'", other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid locale code '{0}'")]
    InvalidLocale(String),

    #[error("Master record '{0}' not found")]
    MasterUnresolved(String),

    #[error("Locale store error: {0}")]
    Store(#[from] importer_common::Error),
}

/// What a successful `link` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkOutcome {
    /// The unit carried no locale information
    NotRequested,
    /// No locale collaborator is active
    NoCollaborator,
    /// Locale tagged, no master to link to
    LocaleSet,
    /// Locale tagged, master not imported yet
    MasterPending { master_external_id: String },
    /// Locale tagged and merged into the master's group
    Linked {
        anchor: RecordId,
        group: TranslationGroup,
    },
}

/// Locale problem attached to an otherwise successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkWarning {
    NoCollaborator { reason: String },
    MasterUnresolved { master_external_id: String },
    InvalidLocale { locale: String },
    Failed { message: String },
}

impl fmt::Display for LinkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkWarning::NoCollaborator { reason } => write!(f, "locale not linked: {}", reason),
            LinkWarning::MasterUnresolved { master_external_id } => {
                write!(f, "master record '{}' not found", master_external_id)
            }
            LinkWarning::InvalidLocale { locale } => write!(f, "invalid locale code '{}'", locale),
            LinkWarning::Failed { message } => write!(f, "locale link failed: {}", message),
        }
    }
}

impl From<LinkError> for LinkWarning {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::InvalidLocale(locale) => LinkWarning::InvalidLocale { locale },
            LinkError::MasterUnresolved(master_external_id) => {
                LinkWarning::MasterUnresolved { master_external_id }
            }
            LinkError::Store(e) => LinkWarning::Failed {
                message: e.to_string(),
            },
        }
    }
}

pub struct LocaleLinkManager {
    collaborator: Option<Arc<dyn LocaleCollaborator>>,
    identity: IdentityResolver,
    master_policy: MasterPolicy,
    configuration_error: Option<String>,
}

impl LocaleLinkManager {
    /// Use `collaborator` as-is, without availability checks
    pub fn new(collaborator: Arc<dyn LocaleCollaborator>, identity: IdentityResolver) -> Self {
        Self {
            collaborator: Some(collaborator),
            identity,
            master_policy: MasterPolicy::default(),
            configuration_error: None,
        }
    }

    /// Manager with no collaborator; every locale request becomes a warning
    pub fn disabled(identity: IdentityResolver, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = %reason, "Locale linking disabled");
        Self {
            collaborator: None,
            identity,
            master_policy: MasterPolicy::default(),
            configuration_error: Some(reason),
        }
    }

    /// Pick the first available collaborator from `candidates` (priority order)
    pub fn detect(candidates: Vec<Arc<dyn LocaleCollaborator>>, identity: IdentityResolver) -> Self {
        let checked: Vec<&'static str> = candidates.iter().map(|c| c.name()).collect();
        let available: Vec<Arc<dyn LocaleCollaborator>> =
            candidates.into_iter().filter(|c| c.is_available()).collect();

        if available.len() > 1 {
            let names: Vec<&'static str> = available.iter().map(|c| c.name()).collect();
            warn!(
                available = ?names,
                using = names[0],
                "Several locale collaborators available, using the first"
            );
        }

        match available.into_iter().next() {
            Some(collaborator) => {
                info!(collaborator = collaborator.name(), "Locale collaborator selected");
                Self::new(collaborator, identity)
            }
            None => Self::disabled(
                identity,
                format!("no locale collaborator available (checked: {:?})", checked),
            ),
        }
    }

    pub fn with_master_policy(mut self, master_policy: MasterPolicy) -> Self {
        self.master_policy = master_policy;
        self
    }

    pub fn collaborator_name(&self) -> Option<&'static str> {
        self.collaborator.as_ref().map(|c| c.name())
    }

    /// Reason no collaborator is active, if none is
    pub fn configuration_error(&self) -> Option<&str> {
        self.configuration_error.as_deref()
    }

    /// Tag `record_id` with its locale and merge it into its master's group
    pub async fn link<S>(
        &self,
        store: &S,
        record_id: RecordId,
        info: Option<&LocaleInfo>,
    ) -> Result<LinkOutcome, LinkError>
    where
        S: RecordStore + ?Sized,
    {
        let Some(info) = info else {
            return Ok(LinkOutcome::NotRequested);
        };

        let Some(collaborator) = &self.collaborator else {
            return Ok(LinkOutcome::NoCollaborator);
        };

        if !is_valid_locale(&info.locale) {
            return Err(LinkError::InvalidLocale(info.locale.clone()));
        }

        collaborator.set_record_locale(record_id, &info.locale).await?;
        debug!(record_id = %record_id, locale = %info.locale, "Record locale set");

        let master = match info.master_external_id.as_deref() {
            Some(master) if !master.trim().is_empty() => self.identity.strip_prefix(master),
            _ => return Ok(LinkOutcome::LocaleSet),
        };

        let anchor = match self.identity.resolve(store, master).await? {
            Some(anchor) => anchor,
            None => {
                return match self.master_policy {
                    MasterPolicy::Lenient => {
                        warn!(record_id = %record_id, master, "Master record not imported yet, link skipped");
                        Ok(LinkOutcome::MasterPending {
                            master_external_id: master.to_string(),
                        })
                    }
                    MasterPolicy::Strict => Err(LinkError::MasterUnresolved(master.to_string())),
                };
            }
        };

        if anchor == record_id {
            debug!(record_id = %record_id, "Record is its own master, nothing to link");
            return Ok(LinkOutcome::LocaleSet);
        }

        let mut group = collaborator.get_translation_group(anchor).await?;
        let mut changed = false;

        if !group.contains_record(anchor) {
            if let Some(master_locale) = collaborator.get_record_locale(anchor).await? {
                changed |= group.insert(master_locale, anchor);
            }
        }

        if let Some(previous) = group.get(&info.locale) {
            if previous != record_id {
                warn!(
                    locale = %info.locale,
                    previous = %previous,
                    record_id = %record_id,
                    "Replacing translation for locale"
                );
            }
        }
        changed |= group.insert(info.locale.clone(), record_id);

        if changed {
            collaborator.save_translation_group(anchor, &group).await?;
            info!(anchor = %anchor, record_id = %record_id, locales = group.len(), "Translation group updated");
        } else {
            debug!(anchor = %anchor, record_id = %record_id, "Translation group already up to date");
        }

        Ok(LinkOutcome::Linked { anchor, group })
    }
}

impl fmt::Debug for LocaleLinkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocaleLinkManager")
            .field("collaborator", &self.collaborator_name())
            .field("master_policy", &self.master_policy)
            .field("configuration_error", &self.configuration_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MetadataStore, SqliteStore, SqliteTranslations};
    use crate::types::RecordBody;
    use async_trait::async_trait;
    use importer_common::Result;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqliteStore, Arc<SqliteTranslations>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        importer_common::db::create_schema(&pool).await.unwrap();
        let translations = Arc::new(SqliteTranslations::new(pool.clone()));
        (SqliteStore::new(pool), translations)
    }

    async fn imported(store: &SqliteStore, external_id: &str) -> RecordId {
        let id = store.create(&RecordBody::new(external_id)).await.unwrap();
        let key = IdentityResolver::default().index_key(external_id);
        store.set(id, &key, &json!(external_id)).await.unwrap();
        id
    }

    struct Unavailable;

    #[async_trait]
    impl LocaleCollaborator for Unavailable {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn is_available(&self) -> bool {
            false
        }

        async fn set_record_locale(&self, _: RecordId, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn get_record_locale(&self, _: RecordId) -> Result<Option<String>> {
            unreachable!()
        }

        async fn get_translation_group(&self, _: RecordId) -> Result<TranslationGroup> {
            unreachable!()
        }

        async fn save_translation_group(&self, _: RecordId, _: &TranslationGroup) -> Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_detect_prefers_first_available() {
        let (_, translations) = setup().await;
        let candidates: Vec<Arc<dyn LocaleCollaborator>> = vec![Arc::new(Unavailable), translations];
        let manager = LocaleLinkManager::detect(candidates, IdentityResolver::default());
        assert_eq!(manager.collaborator_name(), Some("sqlite"));
        assert!(manager.configuration_error().is_none());
    }

    #[tokio::test]
    async fn test_detect_without_candidates_is_a_noop() {
        let (store, _) = setup().await;
        let candidates: Vec<Arc<dyn LocaleCollaborator>> = vec![Arc::new(Unavailable)];
        let manager = LocaleLinkManager::detect(candidates, IdentityResolver::default());
        assert!(manager.configuration_error().is_some());

        let record = imported(&store, "ext-1").await;
        let outcome = manager
            .link(&store, record, Some(&LocaleInfo::new("en")))
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::NoCollaborator);
    }

    #[tokio::test]
    async fn test_link_backfills_master_locale() {
        let (store, translations) = setup().await;
        let manager = LocaleLinkManager::new(translations.clone(), IdentityResolver::default());
        let a = imported(&store, "a").await;
        let b = imported(&store, "b").await;

        manager.link(&store, a, Some(&LocaleInfo::new("en"))).await.unwrap();
        let outcome = manager
            .link(&store, b, Some(&LocaleInfo::new("fi").with_master("gi_a")))
            .await
            .unwrap();

        let expected: TranslationGroup =
            vec![("en".to_string(), a), ("fi".to_string(), b)].into_iter().collect();
        assert_eq!(
            outcome,
            LinkOutcome::Linked {
                anchor: a,
                group: expected.clone()
            }
        );
        assert_eq!(translations.get_translation_group(a).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_master_follows_policy() {
        let (store, translations) = setup().await;
        let record = imported(&store, "b").await;
        let info = LocaleInfo::new("fi").with_master("later");

        let lenient = LocaleLinkManager::new(translations.clone(), IdentityResolver::default());
        let outcome = lenient.link(&store, record, Some(&info)).await.unwrap();
        assert_eq!(
            outcome,
            LinkOutcome::MasterPending {
                master_external_id: "later".to_string()
            }
        );
        assert_eq!(
            translations.get_record_locale(record).await.unwrap().as_deref(),
            Some("fi")
        );

        let strict = LocaleLinkManager::new(translations, IdentityResolver::default())
            .with_master_policy(MasterPolicy::Strict);
        let result = strict.link(&store, record, Some(&info)).await;
        assert!(matches!(result, Err(LinkError::MasterUnresolved(m)) if m == "later"));
    }

    #[tokio::test]
    async fn test_invalid_locale_is_not_linked() {
        let (store, translations) = setup().await;
        let manager = LocaleLinkManager::new(translations.clone(), IdentityResolver::default());
        let record = imported(&store, "a").await;

        let result = manager.link(&store, record, Some(&LocaleInfo::new("english"))).await;
        assert!(matches!(result, Err(LinkError::InvalidLocale(_))));
        assert_eq!(translations.get_record_locale(record).await.unwrap(), None);
    }

    #[test]
    fn test_link_error_to_warning() {
        let warning = LinkWarning::from(LinkError::MasterUnresolved("m".to_string()));
        assert_eq!(warning.to_string(), "master record 'm' not found");
    }
}
