use crate::source::{TokenThresholds, tvdb::TVDB_BASE_URL, tvmaze::TVMAZE_BASE_URL};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub indexer: IndexerConfig,
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tvrecon").join("config.toml"))
    }

    /// Load defaults, then the TOML file (explicit or default path), then
    /// `TVRECON__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&Self::default())?,
        );

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(
                        File::from(path).format(FileFormat::Toml).required(false),
                    );
                }
            }
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix("TVRECON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string on top of the defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.providers
            .tokens
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.engine.workers == 0 {
            return Err(ConfigError::Invalid("engine.workers must be at least 1".to_string()));
        }
        if self.engine.copy_buffer_bytes == 0 {
            return Err(ConfigError::Invalid(
                "engine.copy_buffer_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Metadata provider endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub tvdb_base_url: String,
    pub tvdb_api_key: Option<String>,
    pub tvmaze_base_url: String,
    pub timeout_secs: u64,
    pub tokens: TokenThresholds,
}

impl ProvidersConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            tvdb_base_url: TVDB_BASE_URL.to_string(),
            tvdb_api_key: None,
            tvmaze_base_url: TVMAZE_BASE_URL.to_string(),
            timeout_secs: 30,
            tokens: TokenThresholds::default(),
        }
    }
}

/// Torznab-style indexer used to search for missing episodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    /// Path to the indexer endpoint, e.g. `/api/v2.0/indexers/all/results/torznab`
    pub path: String,
    pub api_key: String,
    /// Only search when a user asked for the scan
    pub manual_scan_only: bool,
    /// Skip searching during full scans
    pub skip_on_full_scan: bool,
    pub timeout_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "localhost".to_string(),
            port: 9117,
            path: "/api/v2.0/indexers/all/results/torznab".to_string(),
            api_key: String::new(),
            manual_scan_only: false,
            skip_on_full_scan: false,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queues processed concurrently
    pub workers: usize,
    pub copy_buffer_bytes: usize,
    /// Where downloaded torrent/nzb payloads are saved
    pub download_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, 4),
            copy_buffer_bytes: 1024 * 1024,
            download_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            ttl_secs: 86400, // 24 hours
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
    /// Directory for daily-rolling log files; console only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.tokens, TokenThresholds::default());
        assert!(!config.indexer.enabled);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [indexer]
            enabled = true
            server = "jackett.lan"
            api_key = "abc"

            [engine]
            workers = 2
            "#,
        )
        .unwrap();

        assert!(config.indexer.enabled);
        assert_eq!(config.indexer.server, "jackett.lan");
        assert_eq!(config.indexer.port, 9117);
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.providers.tvmaze_base_url, TVMAZE_BASE_URL);
    }

    #[test]
    fn test_misordered_token_thresholds_rejected() {
        let err = AppConfig::from_toml(
            r#"
            [providers.tokens]
            stale_after_secs = 90000
            invalid_after_secs = 80000
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rendered_config_loads_back() {
        let mut config = AppConfig::default();
        config.indexer.server = "jackett.lan".to_string();
        config.engine.workers = 3;

        let reloaded = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reloaded.indexer.server, "jackett.lan");
        assert_eq!(reloaded.engine.workers, 3);
        assert_eq!(reloaded.providers.tokens, config.providers.tokens);
    }
}
