//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the per-user configuration directory
pub const APP_DIR_NAME: &str = "content-importer";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent default
    default_root_folder()
}

/// Default configuration file path for the platform, if it exists
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./importer_data"))
}

/// Read and parse a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var("IMPORTER_TEST_ROOT", "/from/env");
        let root = resolve_root_folder(
            Some(Path::new("/from/cli")),
            "IMPORTER_TEST_ROOT",
            Some(Path::new("/from/toml")),
        );
        std::env::remove_var("IMPORTER_TEST_ROOT");
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_env_beats_toml() {
        std::env::set_var("IMPORTER_TEST_ROOT", "/from/env");
        let root = resolve_root_folder(None, "IMPORTER_TEST_ROOT", Some(Path::new("/from/toml")));
        std::env::remove_var("IMPORTER_TEST_ROOT");
        assert_eq!(root, PathBuf::from("/from/env"));
    }

    #[test]
    #[serial]
    fn test_falls_back_to_default() {
        std::env::remove_var("IMPORTER_TEST_ROOT");
        let root = resolve_root_folder(None, "IMPORTER_TEST_ROOT", None);
        assert_eq!(root, default_root_folder());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"importer\"\n[logging]\nlevel = \"debug\"").unwrap();

        let sample: Sample = load_toml_file(file.path()).unwrap();
        assert_eq!(sample.name, "importer");
        assert_eq!(sample.logging.level, "debug");
    }

    #[test]
    fn test_load_toml_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = ").unwrap();

        let result: Result<Sample> = load_toml_file(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
