//! Tidewatch: incremental data acquisition and drift detection
//!
//! This crate discovers structured data sources (APIs, files, web tables,
//! RSS/Atom feeds), downloads them resumably in checkpointed batches, and
//! continuously verifies that the local copy still matches the origin.

pub mod adapter;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod detect;
pub mod download;
pub mod limiter;
pub mod record;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Tidewatch operations
#[derive(Debug, Error)]
pub enum TideError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parse error for {url}: {message}")]
    FeedParse { url: String, message: String },

    #[error("Source {0} not found")]
    SourceNotFound(i64),

    #[error("Unknown source type: {0}")]
    UnknownSourceType(String),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SourceStatus,
        to: state::SourceStatus,
    },

    #[error("Download failed for source {source_id}: {message}")]
    Download { source_id: i64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Tidewatch operations
pub type Result<T> = std::result::Result<T, TideError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use record::Record;
pub use state::SourceStatus;
pub use url::{extract_domain, is_allowed_domain, normalize_url};
