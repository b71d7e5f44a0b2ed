use serde::Deserialize;

/// Main configuration structure for Tidewatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub limits: LimitsConfig,
    pub download: DownloadConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
    pub storage: StorageConfig,
    /// Structured sources registered at startup
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
}

/// Crawl frontier and page fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Domain suffixes the crawler is allowed to visit (e.g. ".gov.ua")
    #[serde(rename = "allowed-domain-suffixes")]
    pub allowed_domain_suffixes: Vec<String>,

    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of pages to fetch in one crawl run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Fixed delay between page fetches (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Fan-out cap for links extracted from low-relevance pages
    #[serde(rename = "max-links-low-relevance", default = "default_low_relevance_fanout")]
    pub max_links_low_relevance: usize,

    /// Seed URLs injected into the frontier at priority 1, depth 0
    #[serde(rename = "seed-urls", default)]
    pub seed_urls: Vec<String>,
}

fn default_low_relevance_fanout() -> usize {
    10
}

/// Shared resource limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Ceiling on outbound requests over any trailing minute
    #[serde(rename = "requests-per-minute")]
    pub requests_per_minute: usize,

    /// Number of concurrent download workers
    #[serde(rename = "worker-pool-size")]
    pub worker_pool_size: usize,
}

/// Download manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Records fetched per batch
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Delay between consecutive batches (milliseconds)
    #[serde(rename = "pacing-delay-ms")]
    pub pacing_delay_ms: u64,

    /// Cooldown after an explicit rate-limit signal (seconds)
    #[serde(rename = "rate-limit-cooldown-secs", default = "default_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_cooldown() -> u64 {
    60
}

/// Backoff policy for retryable fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on each subsequent attempt
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Periodic task runner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Scheduler wake-up tick (seconds)
    #[serde(rename = "tick-secs")]
    pub tick_secs: u64,

    #[serde(rename = "verification-interval-hours")]
    pub verification_interval_hours: u64,

    #[serde(rename = "change-detection-interval-hours")]
    pub change_detection_interval_hours: u64,

    #[serde(rename = "incremental-dataset-interval-hours")]
    pub incremental_dataset_interval_hours: u64,

    /// Minimum created/updated events before a new dataset version is cut
    #[serde(rename = "min-new-samples")]
    pub min_new_samples: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            verification_interval_hours: 24,
            change_detection_interval_hours: 6,
            incremental_dataset_interval_hours: 24,
            min_new_samples: 100,
        }
    }
}

/// External classifier endpoint; absent means the neutral default is used
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,

    #[serde(rename = "timeout-secs", default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_timeout() -> u64 {
    60
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A structured source declared in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub url: String,

    /// One of "api", "file", "web", "rss"
    #[serde(rename = "type")]
    pub source_type: String,

    /// Opaque adapter configuration (auth, pagination parameter names)
    #[serde(default)]
    pub metadata: Option<toml::Value>,
}
