//! Configuration loading and management
//!
//! Handles parsing of `.datum.toml` project configuration files and the
//! per-user credentials store for provider access tokens.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the project configuration file at the repository root.
pub const CONFIG_FILE: &str = ".datum.toml";

/// Environment variable overriding the credentials store location (tests).
pub const CONFIG_HOME_ENV: &str = "DATUM_CONFIG_HOME";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory (relative to the repository root) where dataset data lands
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Provider endpoint overrides
    #[serde(default)]
    pub providers: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            providers: ProviderConfig::default(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the Dataverse instance used for exports
    #[serde(default = "default_dataverse_url")]
    pub dataverse_url: String,

    /// Base URL of the Zenodo instance
    #[serde(default = "default_zenodo_url")]
    pub zenodo_url: String,
}

fn default_dataverse_url() -> String {
    "https://demo.dataverse.org".to_string()
}

fn default_zenodo_url() -> String {
    "https://zenodo.org".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            dataverse_url: default_dataverse_url(),
            zenodo_url: default_zenodo_url(),
        }
    }
}

impl Config {
    /// Load configuration from `<repo_root>/.datum.toml`.
    ///
    /// A missing or empty file yields the defaults; a malformed file is an
    /// error so typos do not silently change behavior.
    pub fn load_from_repo(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(toml::from_str(&content)?)
    }
}

/// Per-user store for provider access tokens.
///
/// Tokens live outside the repository so they are never committed. The file
/// maps a provider id to its secrets:
///
/// ```toml
/// [zenodo]
/// access_token = "..."
/// ```
#[derive(Debug, Clone)]
pub struct CredentialsStore {
    path: PathBuf,
}

type CredentialsTable = BTreeMap<String, BTreeMap<String, String>>;

impl CredentialsStore {
    /// The per-user global store.
    pub fn global() -> Result<Self> {
        if let Ok(home) = std::env::var(CONFIG_HOME_ENV) {
            return Ok(Self::at_dir(Path::new(&home)));
        }

        let dirs = directories::ProjectDirs::from("", "", "datum").ok_or_else(|| {
            Error::Usage("Cannot determine a configuration directory for credentials.".into())
        })?;
        Ok(Self::at_dir(dirs.config_dir()))
    }

    /// A store rooted at an explicit directory.
    pub fn at_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("credentials.toml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a secret for a provider, if stored.
    pub fn get(&self, provider: &str, key: &str) -> Result<Option<String>> {
        let table = self.read_table()?;
        Ok(table
            .get(provider)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    /// Store a secret for a provider.
    pub fn set(&self, provider: &str, key: &str, value: &str) -> Result<()> {
        let mut table = self.read_table()?;
        table
            .entry(provider.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.write_table(&table)
    }

    /// Remove a secret for a provider. Removing an absent entry is a no-op.
    pub fn remove(&self, provider: &str, key: &str) -> Result<()> {
        let mut table = self.read_table()?;
        if let Some(entries) = table.get_mut(provider) {
            entries.remove(key);
            if entries.is_empty() {
                table.remove(provider);
            }
        }
        self.write_table(&table)
    }

    fn read_table(&self) -> Result<CredentialsTable> {
        if !self.path.exists() {
            return Ok(CredentialsTable::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(CredentialsTable::new());
        }
        Ok(toml::from_str(&content)?)
    }

    fn write_table(&self, table: &CredentialsTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(table)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_repo(dir.path()).unwrap();
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.providers.zenodo_url, "https://zenodo.org");
    }

    #[test]
    fn partial_config_keeps_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "data_dir = \"input\"\n").unwrap();

        let config = Config::load_from_repo(dir.path()).unwrap();
        assert_eq!(config.data_dir, "input");
        assert_eq!(config.providers.dataverse_url, "https://demo.dataverse.org");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "data_dir = [not toml").unwrap();
        assert!(Config::load_from_repo(dir.path()).is_err());
    }

    #[test]
    fn credentials_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = CredentialsStore::at_dir(dir.path());

        assert_eq!(store.get("zenodo", "access_token").unwrap(), None);

        store.set("zenodo", "access_token", "secret").unwrap();
        assert_eq!(
            store.get("zenodo", "access_token").unwrap().as_deref(),
            Some("secret")
        );

        store.remove("zenodo", "access_token").unwrap();
        assert_eq!(store.get("zenodo", "access_token").unwrap(), None);

        // Removing again is a no-op.
        store.remove("zenodo", "access_token").unwrap();
    }
}
