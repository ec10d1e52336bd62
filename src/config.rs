//! Configuration management for the collection engine
//!
//! Strongly-typed configuration with validation, environment variable parsing
//! and sensible defaults.
//!
//! # Example
//! ```no_run
//! use collection_engine::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Indexer network: {}", config.indexer.network);
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default base delay for the exponential backoff
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream NFT indexer configuration
    pub indexer: IndexerConfig,
    /// Loader retry configuration
    pub loader: LoaderConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Favorites persistence
    pub favorites: FavoritesConfig,
}

/// NFT indexer (Alchemy NFT API v3) configuration
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// API key; `None` leaves the fetcher in a not-configured state
    pub api_key: Option<String>,
    /// Network slug, e.g. `eth-mainnet`
    pub network: String,
    /// Full base URL override (mainly for tests and proxies)
    pub base_url: Option<String>,
    /// NFTs requested per page
    pub page_size: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Collection loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base delay for exponential backoff
    pub retry_delay: Duration,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout (covers the loader's retry window)
    pub request_timeout: Duration,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
    /// Prometheus exporter port (only used with the `prometheus` feature)
    pub metrics_port: u16,
}

/// Favorites store configuration
#[derive(Debug, Clone)]
pub struct FavoritesConfig {
    /// JSON file holding the favorite token ids
    pub path: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl IndexerConfig {
    /// Base URL for the NFT API endpoints
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.g.alchemy.com/nft/v3/{}",
                self.network,
                self.api_key.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Platforms that mount secrets as files: each file name is the env
        // var name and its contents is the value.
        if let Ok(folder) = std::env::var("FFOLDER") {
            load_env_folder(&folder);
        } else {
            // Try to load .env file (ignore if not found)
            dotenvy::dotenv().ok();
        }

        let config = Self {
            indexer: IndexerConfig::from_env()?,
            loader: LoaderConfig::from_env()?,
            api: ApiConfig::from_env()?,
            favorites: FavoritesConfig::from_env(),
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.indexer.page_size == 0 || self.indexer.page_size > 100 {
            return Err(Error::InvalidConfig {
                key: "INDEXER_PAGE_SIZE",
                message: format!("page size must be 1-100, got {}", self.indexer.page_size)
                    .into(),
            });
        }

        if self.indexer.api_key.is_none() && self.indexer.base_url.is_none() {
            warn!("ALCHEMY_API_KEY is not set; collection loads will fail until it is configured");
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Indexer:");
        info!("    Base URL: {}", mask_url(&self.indexer.resolved_base_url()));
        info!("    Page Size: {}", self.indexer.page_size);
        info!("    Timeout: {:?}", self.indexer.request_timeout);
        info!("  Loader:");
        info!("    Retry base delay: {:?}", self.loader.retry_delay);
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Favorites: {}", self.favorites.path.display());
    }
}

impl IndexerConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: get_env("ALCHEMY_API_KEY").ok().filter(|k| !k.is_empty()),
            network: get_env_or("ALCHEMY_NETWORK", "eth-mainnet"),
            base_url: get_env("INDEXER_BASE_URL").ok().filter(|u| !u.is_empty()),
            page_size: get_env_or("INDEXER_PAGE_SIZE", "20").parse().unwrap_or(20),
            request_timeout: Duration::from_secs(
                get_env_or("INDEXER_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
        })
    }
}

impl LoaderConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            retry_delay: Duration::from_millis(get_env_parsed_or(
                "LOADER_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )?),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_or("API_PORT", "8080").parse().unwrap_or(8080),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "120")
                    .parse()
                    .unwrap_or(120),
            ),
            cors_enabled: get_env_or("API_CORS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            metrics_port: get_env_or("METRICS_PORT", "9000").parse().unwrap_or(9000),
        })
    }
}

impl FavoritesConfig {
    fn from_env() -> Self {
        Self {
            path: PathBuf::from(get_env_or("FAVORITES_PATH", "nft-favorites.json")),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Export every file in `folder` as an env var unless already set
fn load_env_folder(folder: &str) {
    let path = std::path::Path::new(folder);
    if !path.is_dir() {
        return;
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Failed to read FFOLDER {}: {}", folder, err);
            return;
        }
    };
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let file = entry.path();
        if !file.is_file() || std::env::var(&name).is_ok() {
            continue;
        }
        if let Ok(contents) = std::fs::read_to_string(&file) {
            std::env::set_var(&name, contents.trim());
        }
    }
    info!("Loaded configuration from FFOLDER={}", folder);
}

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, rejecting malformed values
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Mask the API key segment of an Alchemy-style URL
fn mask_url(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((prefix, key)) if key.len() > 6 && url.contains("alchemy.com") => {
            format!("{}/{}****", prefix, &key[..4])
        }
        _ => url.to_string(),
    }
}
