//! Configuration module for Tidewatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CrawlConfig, DownloadConfig, LimitsConfig, RetryConfig,
    ScheduleConfig, SourceEntry, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
