use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Known source type tags, matching the adapter factory
const SOURCE_TYPES: &[&str] = &["api", "file", "web", "rss"];

/// Validates a parsed configuration
///
/// Checks that numeric limits are usable, seed URLs parse, and declared
/// sources carry a known type tag.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawl.max_depth == 0 {
        return Err(ConfigError::Validation(
            "crawl.max-depth must be at least 1".to_string(),
        ));
    }

    if config.crawl.max_pages == 0 {
        return Err(ConfigError::Validation(
            "crawl.max-pages must be at least 1".to_string(),
        ));
    }

    if config.limits.requests_per_minute == 0 {
        return Err(ConfigError::Validation(
            "limits.requests-per-minute must be at least 1".to_string(),
        ));
    }

    if config.limits.worker_pool_size == 0 {
        return Err(ConfigError::Validation(
            "limits.worker-pool-size must be at least 1".to_string(),
        ));
    }

    if config.download.batch_size == 0 {
        return Err(ConfigError::Validation(
            "download.batch-size must be at least 1".to_string(),
        ));
    }

    if config.download.retry.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "download.retry.max-attempts must be at least 1".to_string(),
        ));
    }

    for seed in &config.crawl.seed_urls {
        Url::parse(seed).map_err(|_| ConfigError::InvalidUrl(seed.clone()))?;
    }

    for source in &config.sources {
        Url::parse(&source.url).map_err(|_| ConfigError::InvalidUrl(source.url.clone()))?;

        if !SOURCE_TYPES.contains(&source.source_type.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown source type '{}' for {} (expected one of {:?})",
                source.source_type, source.url, SOURCE_TYPES
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn base_config() -> Config {
        Config {
            crawl: CrawlConfig {
                allowed_domain_suffixes: vec![".gov.ua".to_string()],
                max_depth: 4,
                max_pages: 500,
                request_delay_ms: 1000,
                max_links_low_relevance: 10,
                seed_urls: vec!["https://data.gov.ua/".to_string()],
            },
            limits: LimitsConfig {
                requests_per_minute: 30,
                worker_pool_size: 3,
            },
            download: DownloadConfig {
                batch_size: 1000,
                pacing_delay_ms: 100,
                rate_limit_cooldown_secs: 60,
                retry: RetryConfig::default(),
            },
            schedule: ScheduleConfig::default(),
            classifier: None,
            storage: StorageConfig {
                database_path: "./test.db".to_string(),
            },
            sources: vec![],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_zero_max_depth() {
        let mut config = base_config();
        config.crawl.max_depth = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_requests_per_minute() {
        let mut config = base_config();
        config.limits.requests_per_minute = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = base_config();
        config.download.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_seed_url() {
        let mut config = base_config();
        config.crawl.seed_urls.push("not a url".to_string());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_unknown_source_type() {
        let mut config = base_config();
        config.sources.push(SourceEntry {
            url: "https://example.gov.ua/feed".to_string(),
            source_type: "gopher".to_string(),
            metadata: None,
        });
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_known_source_types() {
        for tag in SOURCE_TYPES {
            let mut config = base_config();
            config.sources.push(SourceEntry {
                url: "https://example.gov.ua/data".to_string(),
                source_type: tag.to_string(),
                metadata: None,
            });
            assert!(validate(&config).is_ok(), "type {} should validate", tag);
        }
    }
}
