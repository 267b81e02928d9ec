//! Application configuration for textmark.
//!
//! User config lives at `~/.textmark/textmark.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextmarkError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "textmark.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".textmark";

// ---------------------------------------------------------------------------
// Config structs (matching textmark.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External converter settings.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Batch driver settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// `[converter]` section — how the external pandoc process is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Converter executable name or path.
    #[serde(default = "default_command")]
    pub command: String,

    /// Extra arguments appended after the fixed format arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Wall-clock timeout per invocation, in seconds. 0 disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            extra_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_command() -> String {
    "pandoc".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[batch]` section — defaults for the directory batch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum concurrent converter subprocesses.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// File extension of source documents to pick up.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            extension: default_extension(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_extension() -> String {
    "textile".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.textmark/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TextmarkError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.textmark/textmark.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TextmarkError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        TextmarkError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TextmarkError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TextmarkError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TextmarkError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that a loaded config is usable.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.converter.command.trim().is_empty() {
        return Err(TextmarkError::config("converter command must not be empty"));
    }
    if config.batch.concurrency == 0 {
        return Err(TextmarkError::config("batch concurrency must be at least 1"));
    }
    Ok(())
}
