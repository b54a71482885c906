//! Layered configuration (spec §3 component J, §6): built-in defaults, an
//! optional TOML config file, `ANVIL_`-prefixed environment variables, then
//! explicit CLI flags — each layer overriding the one before it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub root: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            min_backoff_ms: 100,
            max_backoff_ms: 30_000,
        }
    }
}

/// The fully-merged, typed configuration value every subcommand reads from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub std_import_name: StdImportName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StdImportName(pub String);

impl Default for StdImportName {
    fn default() -> Self {
        Self(anvil_jsonnet::DEFAULT_STD_NAME.to_owned())
    }
}

fn default_cache_root() -> String {
    dirs_next::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("anvil")
        .to_string_lossy()
        .into_owned()
}

fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("anvil").join("config.toml"))
}

/// Loads settings by layering, lowest to highest precedence: built-in
/// defaults, an optional config file, `ANVIL_`-prefixed environment
/// variables (`.` mapped to `__`), then explicit overrides the caller has
/// already turned into dotted key/value pairs from CLI flags.
pub fn load(config_path: Option<&str>, overrides: &[(String, String)]) -> Result<Settings, SettingsError> {
    let mut builder = config::Config::builder().add_source(
        config::Config::try_from(&Settings::default())?,
    );

    let file_path = config_path
        .map(PathBuf::from)
        .or_else(default_config_path);
    if let Some(path) = file_path {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANVIL")
            .separator("__")
            .try_parsing(true),
    );

    for (key, value) in overrides {
        builder = builder.set_override(key, value.clone())?;
    }

    builder.build()?.try_deserialize().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let settings = load(Some("/nonexistent/anvil-config.toml"), &[]).unwrap();
        assert_eq!(settings.retry.max_retries, 1);
    }

    #[test]
    fn explicit_override_wins_over_defaults() {
        let overrides = vec![("cache.root".to_owned(), "/tmp/custom-cache".to_owned())];
        let settings = load(Some("/nonexistent/anvil-config.toml"), &overrides).unwrap();
        assert_eq!(settings.cache.root, "/tmp/custom-cache");
    }
}
