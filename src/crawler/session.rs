//! Crawl session
//!
//! Drives one discovery run: dequeue the highest-priority task, fetch and
//! parse the page, classify it, register anything that turned out to be a
//! data source, and enqueue the links worth following. Feed URLs skip the
//! fetch entirely and register directly as rss sources.

use crate::classify::{Classifier, LinkContext, NEUTRAL_RELEVANCE};
use crate::config::CrawlConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::frontier::{CrawlTask, Frontier};
use crate::crawler::parser::parse_page;
use crate::storage::{SourceType, SqliteStorage, Storage};
use crate::url::{extract_domain, is_allowed_domain, normalize_url};
use crate::Result;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Relevance at or above which a page itself counts as a data source
const DATA_SOURCE_RELEVANCE: u8 = 7;

/// Priority assigned to links from low-relevance pages
const LOW_RELEVANCE_PRIORITY: u32 = 7;

/// Counters for one crawl run
#[derive(Debug, Default, Clone)]
pub struct CrawlStats {
    pub total_crawled: u64,
    pub relevant_found: u64,
    pub api_endpoints: u64,
    pub registries: u64,
    pub data_files: u64,
    pub rss_feeds: u64,
    pub errors: u64,
}

impl CrawlStats {
    fn count_source_type(&mut self, source_type: &str) {
        match source_type {
            "api" => self.api_endpoints += 1,
            "registry" => self.registries += 1,
            "data_file" => self.data_files += 1,
            "rss" => self.rss_feeds += 1,
            _ => {}
        }
    }
}

/// One discovery run over the configured domains
pub struct CrawlSession {
    config: CrawlConfig,
    fetcher: PageFetcher,
    classifier: Arc<dyn Classifier>,
    storage: Arc<Mutex<SqliteStorage>>,
    frontier: Frontier,
    visited: HashSet<String>,
    stats: CrawlStats,
    stop: Option<watch::Receiver<bool>>,
}

impl CrawlSession {
    pub fn new(
        config: CrawlConfig,
        fetcher: PageFetcher,
        classifier: Arc<dyn Classifier>,
        storage: Arc<Mutex<SqliteStorage>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            classifier,
            storage,
            frontier: Frontier::new(),
            visited: HashSet::new(),
            stats: CrawlStats::default(),
            stop: None,
        }
    }

    /// Installs a cooperative stop signal checked between pages
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Seeds the frontier and runs the crawl to exhaustion or the page cap
    pub async fn run(&mut self) -> Result<CrawlStats> {
        for seed in self.config.seed_urls.clone() {
            match normalize_url(&seed) {
                Ok(url) if is_allowed_domain(&url, &self.config.allowed_domain_suffixes) => {
                    self.frontier.push(CrawlTask {
                        url: url.to_string(),
                        priority: 1,
                        depth: 0,
                        source_type: Some("seed".to_string()),
                    });
                }
                Ok(url) => warn!(%url, "Seed URL outside allowed domains, skipping"),
                Err(e) => warn!(%seed, error = %e, "Invalid seed URL, skipping"),
            }
        }

        info!(
            seeds = self.frontier.len(),
            max_depth = self.config.max_depth,
            max_pages = self.config.max_pages,
            "Starting crawl"
        );

        while let Some(task) = self.frontier.pop() {
            if self.stop.as_ref().is_some_and(|rx| *rx.borrow()) {
                info!("Stop signal received, ending crawl");
                break;
            }
            if self.stats.total_crawled >= self.config.max_pages as u64 {
                info!("Page cap reached, stopping crawl");
                break;
            }
            if self.visited.contains(&task.url) {
                continue;
            }
            if task.depth > self.config.max_depth {
                continue;
            }
            self.visited.insert(task.url.clone());

            // Feed URLs are registered as sources, not crawled as pages
            if task.source_type.as_deref() == Some("rss") {
                self.register_source(&task.url, SourceType::Rss, "rss")?;
                self.stats.rss_feeds += 1;
                continue;
            }

            self.crawl_page(&task).await?;

            if self.stats.total_crawled % 10 == 0 {
                info!(
                    crawled = self.stats.total_crawled,
                    relevant = self.stats.relevant_found,
                    queued = self.frontier.len(),
                    errors = self.stats.errors,
                    "Crawl progress"
                );
            }
        }

        info!(
            crawled = self.stats.total_crawled,
            relevant = self.stats.relevant_found,
            feeds = self.stats.rss_feeds,
            errors = self.stats.errors,
            "Crawl complete"
        );
        Ok(self.stats.clone())
    }

    async fn crawl_page(&mut self, task: &CrawlTask) -> Result<()> {
        self.stats.total_crawled += 1;
        debug!(url = %task.url, depth = task.depth, priority = task.priority, "Crawling");

        let html = match self.fetcher.fetch(&task.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %task.url, error = %e, "Fetch failed");
                self.stats.errors += 1;
                return Ok(());
            }
        };

        let base_url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %task.url, error = %e, "Unparseable task URL");
                self.stats.errors += 1;
                return Ok(());
            }
        };
        let page = parse_page(&html, &base_url);

        let verdict = self
            .classifier
            .classify_page(&task.url, page.title.as_deref().unwrap_or(""), &page.text)
            .await;
        debug!(url = %task.url, page_type = %verdict.page_type,
               relevance = verdict.relevance, "Page classified");

        if verdict.is_data_source || verdict.relevance >= DATA_SOURCE_RELEVANCE {
            let source_type = infer_source_type(&task.url, &verdict.page_type);
            self.register_source(&task.url, source_type, &verdict.page_type)?;
            self.stats.relevant_found += 1;
            info!(url = %task.url, page_type = %verdict.page_type,
                  relevance = verdict.relevance, "Data source found");
        }

        // Feeds are worth following no matter how dull the page is
        for feed in &page.feed_links {
            self.enqueue(&feed.url, feed.priority, task.depth + 1, Some("rss"));
        }

        if verdict.relevance >= NEUTRAL_RELEVANCE {
            let contexts: Vec<LinkContext> = page
                .links
                .iter()
                .map(|link| LinkContext {
                    text: link.text.clone(),
                    href: link.href.clone(),
                })
                .collect();
            let suggestions = self
                .classifier
                .extract_links(&task.url, &contexts, &verdict)
                .await;

            for suggestion in suggestions {
                let Ok(absolute) = base_url.join(&suggestion.url) else {
                    continue;
                };
                let source_type = suggestion.source_type.as_deref().unwrap_or("unknown");
                if self.enqueue(
                    absolute.as_str(),
                    u32::from(suggestion.priority.clamp(1, 10)),
                    task.depth + 1,
                    Some(source_type),
                ) {
                    self.stats.count_source_type(source_type);
                }
            }
        } else {
            for link in page.links.iter().take(self.config.max_links_low_relevance) {
                self.enqueue(&link.href, LOW_RELEVANCE_PRIORITY, task.depth + 1, None);
            }
        }

        Ok(())
    }

    /// Normalizes, filters, and queues one URL; returns whether it was queued
    fn enqueue(&mut self, url: &str, priority: u32, depth: u32, source_type: Option<&str>) -> bool {
        let Ok(normalized) = normalize_url(url) else {
            return false;
        };
        if !is_allowed_domain(&normalized, &self.config.allowed_domain_suffixes) {
            return false;
        }
        let normalized = normalized.to_string();
        if self.visited.contains(&normalized) {
            return false;
        }

        self.frontier.push(CrawlTask {
            url: normalized,
            priority,
            depth,
            source_type: source_type.map(str::to_string),
        });
        true
    }

    fn register_source(&self, url: &str, source_type: SourceType, page_type: &str) -> Result<()> {
        let parsed = Url::parse(url)?;
        let domain = extract_domain(&parsed).unwrap_or_default();
        let metadata = json!({
            "discovered_by": "crawler",
            "page_type": page_type,
        });

        let mut storage = self.storage.lock().unwrap();
        let source_id = storage.create_source(url, source_type, &domain, Some(&metadata))?;
        debug!(source_id, url, %source_type, "Source registered");
        Ok(())
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }
}

/// Maps a classifier page type (plus URL shape) onto a transport tag
fn infer_source_type(url: &str, page_type: &str) -> SourceType {
    let url = url.to_lowercase();
    let path = url.split(['?', '#']).next().unwrap_or(&url);
    if path.ends_with(".csv") || path.ends_with(".json") || path.ends_with(".xml") {
        return SourceType::File;
    }

    let page_type = page_type.to_lowercase();
    if page_type.contains("api") || url.contains("/api/") {
        SourceType::Api
    } else if page_type.contains("rss") || page_type.contains("feed") {
        SourceType::Rss
    } else {
        SourceType::Web
    }
}
