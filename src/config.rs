//! Configuration system for geotweet.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/geotweet/config.toml`
//! 3. **Environment variables** - `GEOTWEET_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! data_dir = "data"
//! checkpoint = "data/user_vector_means.train.jsonl"
//!
//! [aggregate]
//! checkpoint_every = 10000
//! progress_every = 100
//! keep_checkpoints = 0
//! dimension = 2400
//!
//! [output]
//! format = "text"
//! colors = true
//! log_level = "warn"
//! log_format = "compact"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::aggregate::{DEFAULT_CHECKPOINT_EVERY, DEFAULT_PROGRESS_EVERY};
use crate::error::{GeoError, Result};
use crate::hash_encoder::DEFAULT_DIMENSION;

/// Main configuration structure for geotweet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Aggregation behavior configuration.
    pub aggregate: AggregateConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the split files.
    /// Environment variable: `GEOTWEET_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Checkpoint file.
    /// Environment variable: `GEOTWEET_CHECKPOINT`
    pub checkpoint: Option<PathBuf>,

    /// Feature rows output file.
    pub output: Option<PathBuf>,
}

/// Aggregation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Users between checkpoint writes.
    /// Environment variable: `GEOTWEET_CHECKPOINT_EVERY`
    pub checkpoint_every: usize,

    /// Users between progress events.
    pub progress_every: usize,

    /// Numbered checkpoint copies to retain (0 = single file).
    pub keep_checkpoints: usize,

    /// Encoder output width.
    /// Environment variable: `GEOTWEET_DIMENSION`
    pub dimension: usize,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,

    /// Log level when no `-v` / `-q` flag is given: error, warn, info, debug, trace, off.
    /// Environment variable: `GEOTWEET_LOG_LEVEL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log format: pretty, compact, full.
    /// Environment variable: `GEOTWEET_LOG_FORMAT`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            keep_checkpoints: 0,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
            log_level: None,
            log_format: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/geotweet/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// [`GeoError::ConfigError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| GeoError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| GeoError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(Some(config))
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("geotweet").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `GEOTWEET_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("GEOTWEET_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(checkpoint) = lookup("GEOTWEET_CHECKPOINT") {
            self.paths.checkpoint = Some(PathBuf::from(checkpoint));
        }

        if let Some(n) = lookup("GEOTWEET_CHECKPOINT_EVERY").and_then(|v| v.parse().ok()) {
            self.aggregate.checkpoint_every = n;
        }
        if let Some(n) = lookup("GEOTWEET_DIMENSION").and_then(|v| v.parse().ok()) {
            self.aggregate.dimension = n;
        }

        if let Some(format) = lookup("GEOTWEET_FORMAT") {
            self.output.format = format;
        }
        if lookup("GEOTWEET_NO_COLOR").is_some() || lookup("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if lookup("GEOTWEET_QUIET").is_some() {
            self.output.quiet = true;
        }
        if let Some(level) = lookup("GEOTWEET_LOG_LEVEL") {
            self.output.log_level = Some(level);
        }
        if let Some(format) = lookup("GEOTWEET_LOG_FORMAT") {
            self.output.log_format = Some(format);
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.data_dir.is_some() {
            self.paths.data_dir = other.paths.data_dir;
        }
        if other.paths.checkpoint.is_some() {
            self.paths.checkpoint = other.paths.checkpoint;
        }
        if other.paths.output.is_some() {
            self.paths.output = other.paths.output;
        }

        self.aggregate = other.aggregate;
        self.output = other.output;
    }

    /// Data directory, using the default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(crate::default_data_dir)
    }

    /// Checkpoint path, defaulting to a file inside [`data_dir`](Self::data_dir).
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.paths
            .checkpoint
            .clone()
            .unwrap_or_else(|| crate::default_checkpoint_path(&self.data_dir()))
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregate.checkpoint_every, 10_000);
        assert_eq!(config.aggregate.progress_every, 100);
        assert_eq!(config.aggregate.dimension, 2400);
        assert_eq!(config.data_dir(), PathBuf::from("data"));
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("data").join("user_vector_means.train.jsonl")
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.aggregate.dimension, parsed.aggregate.dimension);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[aggregate]\ncheckpoint_every = 5\n").unwrap();
        assert_eq!(parsed.aggregate.checkpoint_every, 5);
        assert_eq!(parsed.aggregate.progress_every, 100);
        assert!(parsed.output.colors);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.aggregate.keep_checkpoints = 3;
        other.paths.data_dir = Some(PathBuf::from("/custom/data"));

        base.merge(other);

        assert_eq!(base.aggregate.keep_checkpoints, 3);
        assert_eq!(base.data_dir(), PathBuf::from("/custom/data"));
        assert_eq!(
            base.checkpoint_path(),
            PathBuf::from("/custom/data/user_vector_means.train.jsonl")
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GEOTWEET_DATA_DIR", "/srv/tweets"),
            ("GEOTWEET_CHECKPOINT_EVERY", "500"),
            ("GEOTWEET_DIMENSION", "not-a-number"),
            ("NO_COLOR", "1"),
            ("GEOTWEET_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.data_dir(), PathBuf::from("/srv/tweets"));
        assert_eq!(config.aggregate.checkpoint_every, 500);
        assert_eq!(config.aggregate.dimension, 2400);
        assert!(!config.output.colors);
        assert_eq!(config.output.log_level.as_deref(), Some("debug"));
        assert_eq!(config.output.log_format, None);
    }

    #[test]
    fn test_log_settings_from_file() {
        let parsed: Config =
            toml::from_str("[output]\nlog_level = \"warn\"\nlog_format = \"pretty\"\n").unwrap();
        assert_eq!(parsed.output.log_level.as_deref(), Some("warn"));
        assert_eq!(parsed.output.log_format.as_deref(), Some("pretty"));
        assert!(parsed.output.colors);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Config::load_from_file(&path).unwrap().is_none());

        std::fs::write(&path, "[paths]\ndata_dir = \"elsewhere\"\n").unwrap();
        let config = Config::load_from_file(&path).unwrap().unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("elsewhere"));

        std::fs::write(&path, "[paths\n").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(GeoError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[aggregate]"));
        assert!(content.contains("[output]"));
    }
}
