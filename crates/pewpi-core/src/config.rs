//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/pewpi/config.toml)
//! 3. Environment variables (PEWPI_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::crypto::{DEFAULT_ITERATIONS, MAX_ITERATIONS};
use crate::remote::GITHUB_API_URL;

/// Environment variable prefix
const ENV_PREFIX: &str = "PEWPI";

/// Key-value backend collections are persisted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, nothing survives exit
    Memory,
    /// One JSON file per collection under `data_dir/storage`
    #[default]
    File,
    /// Single SQLite database at `data_dir/pewpi.db`
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
            StorageBackend::Sqlite => "sqlite",
        })
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => bail!("Unknown backend '{}' (expected memory, file or sqlite)", other),
        }
    }
}

/// Repository that holds remote backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// File path inside the repository
    #[serde(default = "default_remote_path")]
    pub path: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (collection files, SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: StorageBackend,

    /// Storage prefix of document collections
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,

    /// Storage prefix of the token ledger
    #[serde(default = "default_ledger_prefix")]
    pub ledger_prefix: String,

    /// PBKDF2 rounds for new encrypted backups
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Remote backup target (optional)
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Append logs to this file instead of stderr (optional)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::default(),
            model_prefix: default_model_prefix(),
            ledger_prefix: default_ledger_prefix(),
            kdf_iterations: default_kdf_iterations(),
            remote: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (PEWPI_DATA_DIR, PEWPI_BACKEND, ...)
    /// 2. Config file (~/.config/pewpi/config.toml or PEWPI_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the default location
    pub fn load_with_cli_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("BACKEND") {
            match val.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => warn!(error = %e, "Ignoring {}_BACKEND", ENV_PREFIX),
            }
        }

        if let Some(val) = env_var("MODEL_PREFIX").filter(|v| !v.is_empty()) {
            self.model_prefix = val;
        }

        if let Some(val) = env_var("LEDGER_PREFIX").filter(|v| !v.is_empty()) {
            self.ledger_prefix = val;
        }

        if let Some(val) = env_var("KDF_ITERATIONS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => self.kdf_iterations = n,
                _ => warn!(value = %val, "Ignoring invalid {}_KDF_ITERATIONS", ENV_PREFIX),
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if self.backend == StorageBackend::Memory {
            return Ok(());
        }
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a value by its dotted key (`backend`, `remote.owner`, ...)
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "backend" => self.backend = value.parse()?,
            "model_prefix" => self.model_prefix = non_empty(key, value)?,
            "ledger_prefix" => self.ledger_prefix = non_empty(key, value)?,
            "kdf_iterations" => {
                let n: u32 = value
                    .parse()
                    .with_context(|| format!("kdf_iterations must be a number, got '{}'", value))?;
                if n == 0 || n > MAX_ITERATIONS {
                    bail!("kdf_iterations must be between 1 and {}", MAX_ITERATIONS);
                }
                self.kdf_iterations = n;
            }
            "log_file" => {
                self.log_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => match key.strip_prefix("remote.") {
                Some(field) => self.set_remote_value(field, value)?,
                None => bail!("Unknown config key: {}", key),
            },
        }
        Ok(())
    }

    fn set_remote_value(&mut self, field: &str, value: &str) -> Result<()> {
        let remote = self.remote.get_or_insert_with(|| RemoteConfig {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            path: default_remote_path(),
            api_url: default_api_url(),
        });
        match field {
            "owner" => remote.owner = value.to_string(),
            "repo" => remote.repo = value.to_string(),
            "branch" => remote.branch = non_empty("remote.branch", value)?,
            "path" => remote.path = non_empty("remote.path", value)?,
            "api_url" => remote.api_url = non_empty("remote.api_url", value)?,
            _ => bail!("Unknown config key: remote.{}", field),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with PEWPI_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pewpi")
            .join("config.toml")
    }

    /// Directory of the file backend
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("pewpi.db")
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{} cannot be empty", key);
    }
    Ok(value.to_string())
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pewpi")
}

fn default_model_prefix() -> String {
    "pewpi_model".to_string()
}

fn default_ledger_prefix() -> String {
    "pewpi".to_string()
}

fn default_kdf_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote_path() -> String {
    "backups/ledger.enc.json".to_string()
}

fn default_api_url() -> String {
    GITHUB_API_URL.to_string()
}
