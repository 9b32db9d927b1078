//! Importer configuration
//!
//! # Configuration Priority
//!
//! 1. Command-line arguments (root folder, database path, config file)
//! 2. Environment variables (`IMPORTER_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::identity::DEFAULT_ID_PREFIX;
use crate::locale::MasterPolicy;
use crate::taxonomy::ParentPolicy;
use crate::upsert::{DEFAULT_HOLDING_KEY_PREFIX, DEFAULT_HOLDING_TTL};
use importer_common::config::{default_config_file, load_toml_file, LoggingConfig};
use importer_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_ROOT_FOLDER: &str = "IMPORTER_ROOT";
pub const ENV_ID_PREFIX: &str = "IMPORTER_ID_PREFIX";
pub const ENV_HOLDING_TTL_SECS: &str = "IMPORTER_HOLDING_TTL_SECS";
pub const ENV_PARENT_POLICY: &str = "IMPORTER_PARENT_POLICY";
pub const ENV_MASTER_POLICY: &str = "IMPORTER_MASTER_POLICY";
pub const ENV_LOCALE_COLLABORATOR: &str = "IMPORTER_LOCALE_COLLABORATOR";

/// Database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "importer.db";

/// Longest accepted holding TTL (ten years)
pub const MAX_HOLDING_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Which locale collaborator the engine should try to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocaleCollaboratorKind {
    #[default]
    Sqlite,
    None,
}

impl std::str::FromStr for LocaleCollaboratorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(LocaleCollaboratorKind::Sqlite),
            "none" => Ok(LocaleCollaboratorKind::None),
            other => Err(format!("Unknown locale collaborator '{}'", other)),
        }
    }
}

/// `[engine]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub id_prefix: String,
    pub holding_key_prefix: String,
    pub holding_ttl_secs: u64,
    pub parent_policy: ParentPolicy,
    pub master_policy: MasterPolicy,
    pub locale_collaborator: LocaleCollaboratorKind,
    pub max_lock_wait_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            holding_key_prefix: DEFAULT_HOLDING_KEY_PREFIX.to_string(),
            holding_ttl_secs: DEFAULT_HOLDING_TTL.as_secs(),
            parent_policy: ParentPolicy::default(),
            master_policy: MasterPolicy::default(),
            locale_collaborator: LocaleCollaboratorKind::default(),
            max_lock_wait_ms: 5000,
        }
    }
}

impl EngineSettings {
    pub fn holding_ttl(&self) -> Duration {
        Duration::from_secs(self.holding_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_prefix.is_empty() {
            return Err(Error::Config("engine.id_prefix must not be empty".to_string()));
        }
        if self.holding_ttl_secs == 0 {
            return Err(Error::Config(
                "engine.holding_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.holding_ttl_secs > MAX_HOLDING_TTL_SECS {
            return Err(Error::Config(format!(
                "engine.holding_ttl_secs must be at most {}",
                MAX_HOLDING_TTL_SECS
            )));
        }
        Ok(())
    }

    /// Apply `IMPORTER_*` overrides; `toml_keys` lists the keys set in the file
    pub fn apply_env_overrides(&mut self, toml_keys: &HashSet<String>) -> Result<()> {
        if let Some(value) = env_override(ENV_ID_PREFIX, "id_prefix", toml_keys) {
            self.id_prefix = value;
        }
        if let Some(value) = env_override(ENV_HOLDING_TTL_SECS, "holding_ttl_secs", toml_keys) {
            self.holding_ttl_secs = value.parse().map_err(|e| {
                Error::Config(format!("{}='{}' is not a number: {}", ENV_HOLDING_TTL_SECS, value, e))
            })?;
        }
        if let Some(value) = env_override(ENV_PARENT_POLICY, "parent_policy", toml_keys) {
            self.parent_policy = value.parse().map_err(Error::Config)?;
        }
        if let Some(value) = env_override(ENV_MASTER_POLICY, "master_policy", toml_keys) {
            self.master_policy = value.parse().map_err(Error::Config)?;
        }
        if let Some(value) = env_override(ENV_LOCALE_COLLABORATOR, "locale_collaborator", toml_keys) {
            self.locale_collaborator = value.parse().map_err(Error::Config)?;
        }
        Ok(())
    }
}

fn env_override(var: &str, key: &str, toml_keys: &HashSet<String>) -> Option<String> {
    let value = std::env::var(var).ok()?;
    if value.trim().is_empty() {
        return None;
    }
    if toml_keys.contains(key) {
        warn!(
            env = var,
            key = %format!("engine.{}", key),
            "Setting found in both TOML and environment, using environment"
        );
    }
    Some(value.trim().to_string())
}

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub root_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub engine: EngineSettings,
}

impl ImporterConfig {
    /// Load from `path`, or the platform default file when present
    ///
    /// A missing default file yields the built-in defaults. Environment
    /// overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_file);

        let mut toml_keys = HashSet::new();
        let mut config = match &path {
            Some(path) => {
                let table: toml::Table = load_toml_file(path)?;
                if let Some(toml::Value::Table(engine)) = table.get("engine") {
                    toml_keys.extend(engine.keys().cloned());
                }
                let config: ImporterConfig = toml::Value::Table(table)
                    .try_into()
                    .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => {
                info!("No configuration file found, using defaults");
                ImporterConfig::default()
            }
        };

        config.engine.apply_env_overrides(&toml_keys)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Root folder, honoring CLI → environment → TOML → OS default
    pub fn resolve_root_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        importer_common::config::resolve_root_folder(
            cli_arg,
            ENV_ROOT_FOLDER,
            self.root_folder.as_deref(),
        )
    }

    /// Database file: CLI argument, then TOML, then `<root>/importer.db`
    pub fn resolve_database_path(&self, cli_arg: Option<&Path>, root_folder: &Path) -> PathBuf {
        cli_arg
            .map(Path::to_path_buf)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE))
    }
}
