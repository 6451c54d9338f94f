// Configuration management for symdb

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::index::StalenessPolicy;
use crate::indexer::extractor::ExtractorOptions;

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = ".symdb.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub index: IndexConfig,
    pub extractor: ExtractorConfig,
    pub staleness: StalenessConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Writable index, relative to the project directory unless absolute
    pub path: String,
    /// Read-only indexes queried alongside the primary
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub extensions: Vec<String>,
    /// Directory names pruned during the walk
    pub exclude: Vec<String>,
    /// Optional regex a normalized path must match to be indexed
    pub include: Option<String>,
    /// Reindexed files between commits
    pub batch_size: usize,
    pub package_marker: String,
    pub package_includes_module: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub method_attributes: bool,
    pub self_names: Vec<String>,
    /// Treat any syntax error as a failure of the whole file
    pub skip_files_with_errors: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub policy: StalenessPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".symdb.db".to_string(),
            secondary: Vec::new(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            exclude: vec![
                ".git".to_string(),
                "__pycache__".to_string(),
                ".venv".to_string(),
                "venv".to_string(),
                "node_modules".to_string(),
                ".tox".to_string(),
            ],
            include: None,
            batch_size: 500,
            package_marker: "__init__.py".to_string(),
            package_includes_module: false,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let options = ExtractorOptions::default();
        Self {
            method_attributes: options.method_attributes,
            self_names: options.self_names,
            skip_files_with_errors: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn options(&self) -> ExtractorOptions {
        ExtractorOptions {
            method_attributes: self.method_attributes,
            self_names: self.self_names.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory.
    /// Looks for .symdb.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            tracing::debug!("No {} in {}", CONFIG_FILE, project_dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Compiled include filter, if one is configured
    pub fn include_regex(&self) -> Result<Option<Regex>, regex::Error> {
        self.index.include.as_deref().map(Regex::new).transpose()
    }

    /// Check whether a file has one of the configured source extensions
    pub fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.index.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    /// Check whether a directory name is pruned from walks
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.index.exclude.iter().any(|e| e == name)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("Database path cannot be empty"));
        }

        if self.index.extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one source extension is required"));
        }
        if self.index.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }
        if self.index.package_marker.is_empty() {
            return Err(anyhow::anyhow!("Package marker cannot be empty"));
        }
        if let Err(e) = self.include_regex() {
            return Err(anyhow::anyhow!("Invalid include pattern: {}", e));
        }

        if self.extractor.method_attributes && self.extractor.self_names.is_empty() {
            return Err(anyhow::anyhow!(
                "self_names cannot be empty when method_attributes is enabled"
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

/// Resolve a configured path against the project directory unless absolute
pub fn resolve_path(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
