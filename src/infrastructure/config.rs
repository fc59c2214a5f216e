//! Settings for the linking pipeline.
//!
//! One JSON file under the platform config dir carries four sections:
//! storage (object-store endpoint and bucket), database (SQLite location
//! and pool), linking (run defaults a CLI flag can override), and logging.
//! Credentials come from the environment when set, never from the file.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Object storage connection settings
    pub storage: StorageConfig,

    /// Relational store settings
    pub database: DatabaseConfig,

    /// Linking run defaults (overridable per run)
    pub linking: LinkingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Object storage connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage API, e.g. `https://xyz.supabase.co/storage/v1`
    pub endpoint: String,

    /// Service key sent as a bearer token. Usually supplied via
    /// `SKULINK_STORAGE_API_KEY` rather than the config file.
    pub api_key: Option<String>,

    /// Bucket holding the product images
    pub bucket: String,

    /// Timeout for individual listing requests in seconds
    pub request_timeout_seconds: u64,

    /// Client-side rate limit for storage requests
    pub max_requests_per_second: u32,

    /// Entries requested per listing page
    pub page_size: u32,
}

/// Relational store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL; when absent the database lives under the app data dir.
    /// Usually supplied via `SKULINK_DATABASE_URL`.
    pub url: Option<String>,

    /// Connection pool size
    pub max_connections: u32,
}

/// Linking run defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// Minimum final confidence for a direct link
    pub confidence_threshold: u8,

    /// Minimum final confidence for a review candidate
    pub candidate_threshold: u8,

    /// Hard cap on auto-linked images per product
    pub max_images_per_product: u32,

    /// Records accumulated before the writer task flushes a batch
    pub persist_batch_size: usize,

    /// Hard cap on files collected by one scan
    pub max_files: u32,

    /// Skip products that already have at least one image
    pub skip_existing: bool,

    /// Mark the first link of a product as its primary image
    pub auto_set_primary: bool,

    /// Minimum digits for an extracted SKU candidate
    pub min_sku_length: usize,

    /// Maximum digits for an extracted SKU candidate
    pub max_sku_length: usize,

    /// Extraction candidates below this confidence are discarded
    pub min_extraction_confidence: u8,

    /// Listing-page retries before a scan branch is abandoned
    pub scan_retry_attempts: u32,

    /// Base delay between listing retries in milliseconds
    pub retry_delay_ms: u64,
}

/// Log sinks and verbosity. `RUST_LOG` wins over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, one of error / warn / info / debug / trace
    pub level: String,

    /// Write the log file as JSON lines
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Archived log files kept before the oldest are pruned
    pub max_files: u32,

    /// Prune archived logs at startup
    pub auto_cleanup_logs: bool,

    /// Prune everything except the newest archive
    pub keep_only_latest: bool,

    /// Per-crate level overrides, keyed by module path
    pub module_filters: HashMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            bucket: defaults::BUCKET.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            page_size: defaults::SCAN_PAGE_SIZE,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: defaults::CONFIDENCE_THRESHOLD,
            candidate_threshold: defaults::CANDIDATE_THRESHOLD,
            max_images_per_product: defaults::MAX_IMAGES_PER_PRODUCT,
            persist_batch_size: defaults::PERSIST_BATCH_SIZE,
            max_files: defaults::MAX_FILES,
            skip_existing: defaults::SKIP_EXISTING,
            auto_set_primary: defaults::AUTO_SET_PRIMARY,
            min_sku_length: defaults::MIN_SKU_LENGTH,
            max_sku_length: defaults::MAX_SKU_LENGTH,
            min_extraction_confidence: defaults::MIN_EXTRACTION_CONFIDENCE,
            scan_retry_attempts: defaults::SCAN_RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            keep_only_latest: defaults::LOG_KEEP_ONLY_LATEST,
            // Chatty dependencies stay quiet unless RUST_LOG asks for them.
            module_filters: [
                ("sqlx", "warn"),
                ("reqwest", "info"),
                ("hyper", "warn"),
                ("tokio", "info"),
                ("skulink", "info"),
            ]
            .into_iter()
            .map(|(module, level)| (module.to_string(), level.to_string()))
            .collect(),
        }
    }
}

/// Reads and writes the JSON config file.
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Per-user config directory, `<platform config dir>/skulink`
    pub fn get_config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("No platform config directory available")?
            .join("skulink"))
    }

    /// Per-user data directory for the database and logs
    pub fn get_app_data_dir() -> Result<PathBuf> {
        Ok(dirs::data_local_dir()
            .context("No platform data directory available")?
            .join("skulink"))
    }

    /// Manager over the default config file location
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::get_config_dir()?.join("skulink_config.json"),
        })
    }

    /// Manager over an explicit config file path (`--config` override)
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load the config, writing defaults and preparing the data
    /// directories when the file does not exist yet.
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return self.load_config().await;
        }

        info!("🧭 No config at {:?}, writing defaults", self.config_path);
        let config = AppConfig::default();
        self.save_config(&config).await?;
        self.prepare_data_dirs().await?;
        Ok(apply_env_overrides(config))
    }

    async fn prepare_data_dirs(&self) -> Result<()> {
        let data_dir = Self::get_app_data_dir()?;
        for dir in [data_dir.join("database"), data_dir.join("logs")] {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Cannot create {dir:?}"))?;
        }
        Ok(())
    }

    /// Read the config file, then apply environment overrides on top.
    /// A file that no longer parses is quarantined and replaced with
    /// defaults instead of blocking startup.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            let config = AppConfig::default();
            self.save_config(&config).await?;
            return Ok(apply_env_overrides(config));
        }

        let raw = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Cannot read {:?}", self.config_path))?;

        match serde_json::from_str::<AppConfig>(&raw) {
            Ok(config) => Ok(apply_env_overrides(config)),
            Err(parse_error) => self.quarantine_and_reset(&parse_error).await,
        }
    }

    /// Write the config as pretty-printed JSON, creating the directory
    /// on the way.
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Cannot create {parent:?}"))?;
        }

        let json = serde_json::to_string_pretty(config).context("Config is not serializable")?;
        fs::write(&self.config_path, json)
            .await
            .with_context(|| format!("Cannot write {:?}", self.config_path))?;

        info!("💾 Wrote configuration to {:?}", self.config_path);
        Ok(())
    }

    /// Move an unparseable config aside and start over from defaults.
    async fn quarantine_and_reset(&self, parse_error: &serde_json::Error) -> Result<AppConfig> {
        warn!("⚠️  Config file does not parse: {}", parse_error);

        let quarantined = self.config_path.with_extension("json.corrupted");
        match fs::copy(&self.config_path, &quarantined).await {
            Ok(_) => info!("Kept the broken file at {:?}", quarantined),
            Err(e) => warn!("Could not preserve the broken config: {}", e),
        }

        let config = AppConfig::default();
        self.save_config(&config)
            .await
            .context("Cannot replace the broken config with defaults")?;
        Ok(apply_env_overrides(config))
    }
}

/// Credentials and locations are taken from the environment when present so
/// they never have to live in the config file.
fn apply_env_overrides(mut config: AppConfig) -> AppConfig {
    if let Ok(endpoint) = std::env::var("SKULINK_STORAGE_ENDPOINT") {
        config.storage.endpoint = endpoint;
    }
    if let Ok(api_key) = std::env::var("SKULINK_STORAGE_API_KEY") {
        config.storage.api_key = Some(api_key);
    }
    if let Ok(url) = std::env::var("SKULINK_DATABASE_URL") {
        config.database.url = Some(url);
    }
    config
}

/// Built-in defaults, shared between the config layer and the option
/// structs that mirror it.
pub mod defaults {
    /// Bucket scanned when none is configured
    pub const BUCKET: &str = "product-images";

    /// Timeout for one storage listing request in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Client-side storage rate limit, requests per second
    pub const MAX_REQUESTS_PER_SECOND: u32 = 20;

    /// Entries per storage listing page
    pub const SCAN_PAGE_SIZE: u32 = 1000;

    /// Folder recursion ceiling for scans
    pub const SCAN_MAX_DEPTH: u32 = 10;

    /// Listing retries before a scan branch is abandoned
    pub const SCAN_RETRY_ATTEMPTS: u32 = 3;

    /// Base retry delay in milliseconds, jitter is added on top
    pub const RETRY_DELAY_MS: u64 = 500;

    /// SQLite pool size
    pub const DB_MAX_CONNECTIONS: u32 = 10;

    /// Minimum final confidence for a direct link
    pub const CONFIDENCE_THRESHOLD: u8 = 85;

    /// Minimum final confidence for a review candidate
    pub const CANDIDATE_THRESHOLD: u8 = 60;

    /// Cap on auto-linked images per product
    pub const MAX_IMAGES_PER_PRODUCT: u32 = 10;

    /// Records per persisted batch
    pub const PERSIST_BATCH_SIZE: usize = 500;

    /// Capacity of the channel feeding the batch writer task
    pub const WRITER_CHANNEL_CAPACITY: usize = 1000;

    /// Cap on files collected by one scan
    pub const MAX_FILES: u32 = 10_000;

    /// Skip products that already have an image
    pub const SKIP_EXISTING: bool = true;

    /// Make a product's first link its primary image
    pub const AUTO_SET_PRIMARY: bool = true;

    /// Minimum digits for an extracted SKU
    pub const MIN_SKU_LENGTH: usize = 3;

    /// Maximum digits for an extracted SKU
    pub const MAX_SKU_LENGTH: usize = 8;

    /// Floor below which extraction candidates are discarded
    pub const MIN_EXTRACTION_CONFIDENCE: u8 = 30;

    /// Files between persisted-pause-state polls during matching
    pub const PAUSE_POLL_ITEMS: u32 = 250;

    /// Files between progress writes during matching
    pub const PROGRESS_UPDATE_ITEMS: u32 = 250;

    // Logging defaults
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;
    pub const LOG_KEEP_ONLY_LATEST: bool = false;
}
