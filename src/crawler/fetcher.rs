//! Page fetching for crawl sessions
//!
//! One fetcher serves the whole session: it enforces the fixed inter-request
//! delay and decides per URL whether plain HTTP suffices or the page needs a
//! JavaScript renderer. Fetch failures are reported, never retried; the
//! discovery layer can afford to lose a page.

use crate::{Result, TideError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// URL substrings that suggest a page builds its content with JavaScript
const JS_HINTS: &[&str] = &["search", "query", "filter", "dynamic", "ajax"];

/// Renders a page in a real browser context
///
/// Renderers are typically a handle onto one headless browser, so the
/// fetcher serializes access to it.
#[async_trait]
pub trait JsRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Returns true when a URL looks like it needs JavaScript rendering
pub fn needs_js_rendering(url: &str) -> bool {
    let url = url.to_lowercase();
    JS_HINTS.iter().any(|hint| url.contains(hint))
}

/// Session-wide page fetcher with pacing and optional JS rendering
pub struct PageFetcher {
    client: Client,
    renderer: Option<Arc<Mutex<Box<dyn JsRenderer>>>>,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl PageFetcher {
    pub fn new(client: Client, request_delay: Duration) -> Self {
        Self {
            client,
            renderer: None,
            request_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn JsRenderer>) -> Self {
        self.renderer = Some(Arc::new(Mutex::new(renderer)));
        self
    }

    /// Sleeps off whatever remains of the inter-request delay
    async fn pace(&self) {
        let wait = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let wait = match *last {
                Some(previous) => self.request_delay.saturating_sub(now - previous),
                None => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Fetches a page, rendering through the browser when the URL needs it
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.pace().await;

        if needs_js_rendering(url) {
            if let Some(renderer) = &self.renderer {
                debug!(url, "Fetching with JS renderer");
                let renderer = renderer.lock().await;
                return renderer.render(url).await;
            }
        }

        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TideError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    TideError::Http {
                        url: url.to_string(),
                        source: e,
                    }
                }
            })?
            .error_for_status()
            .map_err(|source| TideError::Http {
                url: url.to_string(),
                source,
            })?;

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_heuristic_matches_hints() {
        assert!(needs_js_rendering("https://e.gov.ua/search?q=registry"));
        assert!(needs_js_rendering("https://e.gov.ua/data/FILTER/all"));
        assert!(needs_js_rendering("https://e.gov.ua/ajax/load"));
        assert!(!needs_js_rendering("https://e.gov.ua/registry/list"));
    }

    #[tokio::test]
    async fn test_pacing_spaces_requests() {
        let fetcher = PageFetcher::new(Client::new(), Duration::from_millis(50));

        let start = Instant::now();
        fetcher.pace().await;
        fetcher.pace().await;
        fetcher.pace().await;

        // Two delays between three requests
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let fetcher = PageFetcher::new(Client::new(), Duration::from_secs(5));

        let start = Instant::now();
        fetcher.pace().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
