use crate::{ActiveFilters, Placetype, PlacetypeRole};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for Placegraph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlacegraphConfig {
    /// Parent/ancestry resolution policy
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Descendant rebuild settings
    #[serde(default)]
    pub cascade: CascadeConfig,

    /// Where records live on disk
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Place-types never queried as parents or ancestors
    #[serde(default = "default_skip_placetypes")]
    pub skip_placetypes: Vec<Placetype>,

    /// Fall back to an ancestor search when no direct parent matches
    #[serde(default = "default_true")]
    pub ensure_hierarchy: bool,

    /// Role priority for the ancestor search
    #[serde(default = "default_ensure_roles")]
    pub ensure_roles: Vec<PlacetypeRole>,

    /// Ancestor keys every entry of an ambiguous record must carry
    #[serde(default = "default_always_present")]
    pub always_present: Vec<Placetype>,

    /// Place-types whose ancestry is pruned against the disambiguating type
    #[serde(default = "default_prune_placetypes")]
    pub prune_placetypes: Vec<Placetype>,

    #[serde(default = "default_disambiguating_placetype")]
    pub disambiguating_placetype: Placetype,

    #[serde(default)]
    pub active: ActiveFilters,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            skip_placetypes: default_skip_placetypes(),
            ensure_hierarchy: true,
            ensure_roles: default_ensure_roles(),
            always_present: default_always_present(),
            prune_placetypes: default_prune_placetypes(),
            disambiguating_placetype: default_disambiguating_placetype(),
            active: ActiveFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Descendant place-types never rebuilt
    #[serde(default = "default_excluded_placetypes")]
    pub excluded_placetypes: Vec<Placetype>,

    /// Place-types stored as single points; matched by centroid
    #[serde(default = "default_point_placetypes")]
    pub point_placetypes: Vec<Placetype>,

    /// Maximum descendants rebuilt at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Page size for intersection queries
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Abort on the first failed update callback
    #[serde(default)]
    pub strict: bool,

    /// Buffer (degrees) applied to the changed record's geometry
    #[serde(default)]
    pub buffer: Option<f64>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            excluded_placetypes: default_excluded_placetypes(),
            point_placetypes: default_point_placetypes(),
            concurrency: default_concurrency(),
            per_page: default_per_page(),
            strict: false,
            buffer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Root directory records are loaded from. Never defaulted.
    #[serde(default)]
    pub data_root: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn placetypes(names: &[&str]) -> Vec<Placetype> {
    names.iter().map(|n| Placetype::new(*n)).collect()
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_skip_placetypes() -> Vec<Placetype> {
    placetypes(&["address", "building"])
}
fn default_ensure_roles() -> Vec<PlacetypeRole> {
    PlacetypeRole::ALL.to_vec()
}
fn default_always_present() -> Vec<Placetype> {
    placetypes(&["continent", "country", "region", "county", "locality"])
}
fn default_prune_placetypes() -> Vec<Placetype> {
    placetypes(&["borough", "macrohood", "neighbourhood"])
}
fn default_disambiguating_placetype() -> Placetype {
    Placetype::new("county")
}
fn default_excluded_placetypes() -> Vec<Placetype> {
    placetypes(&["constituency", "address", "building"])
}
fn default_point_placetypes() -> Vec<Placetype> {
    placetypes(&["venue", "address", "intersection"])
}
fn default_concurrency() -> usize {
    8
}
fn default_per_page() -> usize {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with file discovery and environment overrides
pub struct ConfigManager {
    config: PlacegraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Config file (.placegraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: PlacegraphConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Loaded placegraph config from {}", path.display()),
            None => info!("No placegraph config file found, using defaults"),
        }
        if config.storage.data_root.is_none() {
            warn!("storage.data_root is not set; cascading rebuilds will refuse to run");
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Search order:
    /// 1. ./.placegraph.toml
    /// 2. ~/.placegraph/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(PlacegraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".placegraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".placegraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((PlacegraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<PlacegraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: PlacegraphConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    fn apply_env_overrides(mut config: PlacegraphConfig) -> PlacegraphConfig {
        if let Ok(root) = std::env::var("PLACEGRAPH_DATA_ROOT") {
            if !root.is_empty() {
                config.storage.data_root = Some(PathBuf::from(root));
            }
        }
        if let Ok(concurrency) = std::env::var("PLACEGRAPH_CONCURRENCY") {
            if let Ok(n) = concurrency.parse() {
                config.cascade.concurrency = n;
            }
        }
        if let Ok(per_page) = std::env::var("PLACEGRAPH_PER_PAGE") {
            if let Ok(n) = per_page.parse() {
                config.cascade.per_page = n;
            }
        }
        if let Ok(strict) = std::env::var("PLACEGRAPH_STRICT") {
            config.cascade.strict = strict.to_lowercase() == "true" || strict == "1";
        }

        // Logging
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    pub fn validate_config(config: &PlacegraphConfig) -> Result<(), ConfigError> {
        // RUST_LOG may carry a full directive string; only bare levels are checked
        let level = config.logging.level.as_str();
        if !level.contains('=') && !level.contains(',') {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        if config.cascade.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "cascade.concurrency must be at least 1".to_string(),
            ));
        }
        if config.cascade.per_page == 0 {
            return Err(ConfigError::ValidationError(
                "cascade.per_page must be at least 1".to_string(),
            ));
        }
        if let Some(buffer) = config.cascade.buffer {
            if !buffer.is_finite() || buffer < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "cascade.buffer must be a non-negative number, got {}",
                    buffer
                )));
            }
        }

        let named = config
            .resolver
            .skip_placetypes
            .iter()
            .chain(&config.resolver.always_present)
            .chain(&config.resolver.prune_placetypes)
            .chain(std::iter::once(&config.resolver.disambiguating_placetype))
            .chain(&config.cascade.excluded_placetypes)
            .chain(&config.cascade.point_placetypes);
        for pt in named {
            if pt.as_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "placetype names must not be empty".to_string(),
                ));
            }
        }

        if config.resolver.ensure_roles.is_empty() {
            return Err(ConfigError::ValidationError(
                "resolver.ensure_roles must name at least one role".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PlacegraphConfig {
        &self.config
    }

    pub fn into_config(self) -> PlacegraphConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = PlacegraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlacegraphConfig::default();
        assert!(config.resolver.ensure_hierarchy);
        assert_eq!(config.resolver.disambiguating_placetype.as_str(), "county");
        assert!(config
            .cascade
            .excluded_placetypes
            .contains(&Placetype::new("constituency")));
        assert!(config.storage.data_root.is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = PlacegraphConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.cascade.concurrency = 0;
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config.clone();
        bad_config.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut directive = config;
        directive.logging.level = "placegraph_hierarchy=debug".to_string();
        assert!(ConfigManager::validate_config(&directive).is_ok());
    }
}
