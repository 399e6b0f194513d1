//! Configuration management for Almanac services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with ALMANAC__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Bot identity and schedule
    #[serde(default)]
    pub bot: BotConfig,

    /// Remote catalog API
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Embedded event store
    #[serde(default)]
    pub store: StoreConfig,

    /// Digest delivery behavior
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Messaging transport token; when absent the bot runs with a dry-run transport
    pub token: Option<String>,

    /// Destination chat for the daily digest
    #[serde(default)]
    pub chat_id: String,

    /// Local hour (0-23) at which the daily digest fires
    #[serde(default = "default_send_hour")]
    pub send_hour: u32,

    /// Fixed UTC offset of the audience timezone, in hours
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// GraphQL query endpoint
    #[serde(default = "default_catalog_endpoint")]
    pub endpoint: String,

    /// Public site base used for catalog links and relative cover URLs
    #[serde(default = "default_site_base")]
    pub site_base: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,

    /// Maximum simultaneous in-flight requests to the catalog
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts for author lookups (empty results are retried; upstream is
    /// eventually consistent)
    #[serde(default = "default_author_retry_attempts")]
    pub author_retry_attempts: u32,

    /// Fixed backoff between author lookup attempts, in seconds
    #[serde(default = "default_author_retry_backoff")]
    pub author_retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path to the sqlite database file
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Maximum pool connections
    #[serde(default = "default_store_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Transport caption ceiling for media sends, in characters
    #[serde(default = "default_caption_limit")]
    pub caption_limit: usize,

    /// Attempts for a single message delivery
    #[serde(default = "default_send_retry_attempts")]
    pub send_retry_attempts: u32,

    /// Fixed backoff between delivery attempts, in seconds
    #[serde(default = "default_send_retry_backoff")]
    pub send_retry_backoff_secs: u64,

    /// Pause after a successful media send, in milliseconds
    #[serde(default = "default_media_pacing")]
    pub media_pacing_ms: u64,

    /// Pause after a successful text send, in milliseconds
    #[serde(default = "default_text_pacing")]
    pub text_pacing_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_send_hour() -> u32 { 9 }
fn default_utc_offset() -> i32 { 3 }
fn default_catalog_endpoint() -> String { "https://example.com/graphql".to_string() }
fn default_site_base() -> String { "https://example.com".to_string() }
fn default_catalog_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 5 }
fn default_author_retry_attempts() -> u32 { 4 }
fn default_author_retry_backoff() -> u64 { 3 }
fn default_store_path() -> String { "almanac.db".to_string() }
fn default_store_connections() -> u32 { 5 }
fn default_caption_limit() -> usize { 1024 }
fn default_send_retry_attempts() -> u32 { 3 }
fn default_send_retry_backoff() -> u64 { 2 }
fn default_media_pacing() -> u64 { 500 }
fn default_text_pacing() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "almanac-bot".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ALMANAC_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with ALMANAC__ prefix
            // e.g., ALMANAC__BOT__SEND_HOUR=10
            .add_source(
                Environment::with_prefix("ALMANAC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("ALMANAC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl BotConfig {
    /// Audience timezone as a fixed offset
    pub fn timezone_offset(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| {
            chrono::FixedOffset::east_opt(default_utc_offset() * 3600)
                .expect("default offset is valid")
        })
    }
}

impl CatalogConfig {
    /// Per-call timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for author lookups
    pub fn author_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.author_retry_attempts,
            Duration::from_secs(self.author_retry_backoff_secs),
        )
    }
}

impl DeliveryConfig {
    /// Retry policy for message delivery
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.send_retry_attempts,
            Duration::from_secs(self.send_retry_backoff_secs),
        )
    }

    pub fn media_pacing(&self) -> Duration {
        Duration::from_millis(self.media_pacing_ms)
    }

    pub fn text_pacing(&self) -> Duration {
        Duration::from_millis(self.text_pacing_ms)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            chat_id: String::new(),
            send_hour: default_send_hour(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            site_base: default_site_base(),
            timeout_secs: default_catalog_timeout(),
            max_concurrent: default_max_concurrent(),
            author_retry_attempts: default_author_retry_attempts(),
            author_retry_backoff_secs: default_author_retry_backoff(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_connections: default_store_connections(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            caption_limit: default_caption_limit(),
            send_retry_attempts: default_send_retry_attempts(),
            send_retry_backoff_secs: default_send_retry_backoff(),
            media_pacing_ms: default_media_pacing(),
            text_pacing_ms: default_text_pacing(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}
