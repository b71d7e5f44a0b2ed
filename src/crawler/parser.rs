//! HTML parsing for crawl sessions
//!
//! Extracts the signals the session needs from a fetched page: title,
//! readable text for classification, outgoing links with their anchor text,
//! and advertised RSS/Atom feeds.

use scraper::{Html, Selector};
use url::Url;

/// An outgoing link with its anchor text
#[derive(Debug, Clone)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// A feed advertised by a page, with its crawl priority
#[derive(Debug, Clone)]
pub struct FeedLink {
    pub url: String,
    pub priority: u32,
}

/// Signals extracted from one fetched page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<PageLink>,
    pub feed_links: Vec<FeedLink>,
}

/// Anchor substrings that mark a link as a probable feed
const FEED_HINTS: &[&str] = &["/feed", "/rss", "/atom", ".rss", ".atom"];

/// Parses a fetched HTML document
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        text: extract_text(&document),
        links: extract_links(&document, base_url),
        feed_links: extract_feed_links(&document, base_url),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects readable text from content-bearing elements
///
/// Script, style, and chrome elements never match these selectors, so the
/// classifier sees prose rather than page machinery.
fn extract_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td, th, dd, dt") else {
        return String::new();
    };

    let mut parts = Vec::new();
    for element in document.select(&selector) {
        let text = element.text().collect::<String>();
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }
    parts.join("\n")
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<PageLink> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if let Some(absolute) = resolve_link(href, base_url) {
                links.push(PageLink {
                    text: element.text().collect::<String>().trim().to_string(),
                    href: absolute,
                });
            }
        }
    }

    links
}

/// Finds feeds a page advertises
///
/// `<link rel="alternate">` declarations are authoritative (priority 2);
/// anchors that merely look like feed URLs are speculative (priority 3).
fn extract_feed_links(document: &Html, base_url: &Url) -> Vec<FeedLink> {
    let mut feeds = Vec::new();
    let mut seen = std::collections::HashSet::new();

    if let Ok(selector) = Selector::parse("link[rel='alternate'][href]") {
        for element in document.select(&selector) {
            let mime = element.value().attr("type").unwrap_or("").to_lowercase();
            if !mime.contains("rss") && !mime.contains("atom") {
                continue;
            }
            if let Some(url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if seen.insert(url.clone()) {
                    feeds.push(FeedLink { url, priority: 2 });
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href_lower = href.to_lowercase();
            let text_lower = element.text().collect::<String>().to_lowercase();
            let looks_like_feed = FEED_HINTS.iter().any(|hint| href_lower.contains(hint))
                || text_lower.contains("rss")
                || text_lower == "feed";
            if !looks_like_feed {
                continue;
            }
            if let Some(url) = resolve_link(href, base_url) {
                if seen.insert(url.clone()) {
                    feeds.push(FeedLink { url, priority: 3 });
                }
            }
        }
    }

    feeds
}

/// Resolves an href against the page URL, filtering non-crawlable schemes
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://portal.example.gov.ua/page").unwrap()
    }

    #[test]
    fn test_title_and_text() {
        let html = r#"<html><head><title> Registry </title></head>
            <body><script>ignore()</script><p>Open data portal</p><li>item</li></body></html>"#;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.title, Some("Registry".to_string()));
        assert!(parsed.text.contains("Open data portal"));
        assert!(!parsed.text.contains("ignore"));
    }

    #[test]
    fn test_links_carry_anchor_text() {
        let html = r#"<html><body><a href="/registry">State registry</a></body></html>"#;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].text, "State registry");
        assert_eq!(
            parsed.links[0].href,
            "https://portal.example.gov.ua/registry"
        );
    }

    #[test]
    fn test_skips_non_crawlable_schemes() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">x</a>
            <a href="mailto:a@b">x</a>
            <a href="#anchor">x</a>
            <a href="/ok">ok</a>
        </body></html>"##;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.links.len(), 1);
    }

    #[test]
    fn test_alternate_link_is_priority_two_feed() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/news.rss">
        </head><body></body></html>"#;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.feed_links.len(), 1);
        assert_eq!(parsed.feed_links[0].priority, 2);
        assert_eq!(
            parsed.feed_links[0].url,
            "https://portal.example.gov.ua/news.rss"
        );
    }

    #[test]
    fn test_anchor_feed_is_priority_three() {
        let html = r#"<html><body><a href="/updates/feed">Subscribe</a></body></html>"#;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.feed_links.len(), 1);
        assert_eq!(parsed.feed_links[0].priority, 3);
    }

    #[test]
    fn test_duplicate_feeds_collapse() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/atom+xml" href="/feed">
        </head><body><a href="/feed">RSS</a></body></html>"#;
        let parsed = parse_page(html, &base_url());
        assert_eq!(parsed.feed_links.len(), 1);
        assert_eq!(parsed.feed_links[0].priority, 2);
    }
}
