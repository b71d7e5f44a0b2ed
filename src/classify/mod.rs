//! Page classification
//!
//! The crawler asks a classifier two questions about each fetched page:
//! what kind of page is this (and how relevant is it to data-source
//! discovery), and which of its links are worth following. The production
//! classifier delegates to an OpenAI-compatible chat endpoint; any failure
//! there degrades to a neutral verdict so a dead model server can never
//! stall a crawl.

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Relevance assigned when no classifier signal is available
pub const NEUTRAL_RELEVANCE: u8 = 5;

/// Classifier's judgement of one fetched page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVerdict {
    pub page_type: String,
    /// 1..=10, 10 = most relevant
    pub relevance: u8,
    /// 1..=10, 1 = crawl this page's links first
    pub crawl_priority: u8,
    pub is_data_source: bool,
}

impl PageVerdict {
    /// Verdict used when the classifier is absent or fails
    pub fn neutral() -> Self {
        Self {
            page_type: "unknown".to_string(),
            relevance: NEUTRAL_RELEVANCE,
            crawl_priority: NEUTRAL_RELEVANCE,
            is_data_source: false,
        }
    }
}

/// One link the classifier judged worth following
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub url: String,
    /// 1..=10, 1 = highest
    pub priority: u8,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<u8>,
}

/// Anchor text and target of a link, as context for classification
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub text: String,
    pub href: String,
}

/// Judges pages and picks links to follow
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies a fetched page; must not fail, degrade instead
    async fn classify_page(&self, url: &str, title: &str, text: &str) -> PageVerdict;

    /// Picks the links worth following from a relevant page
    async fn extract_links(
        &self,
        url: &str,
        links: &[LinkContext],
        verdict: &PageVerdict,
    ) -> Vec<LinkSuggestion>;
}

/// Classifier with no model behind it; every page gets the neutral verdict
pub struct NeutralClassifier;

#[async_trait]
impl Classifier for NeutralClassifier {
    async fn classify_page(&self, _url: &str, _title: &str, _text: &str) -> PageVerdict {
        PageVerdict::neutral()
    }

    async fn extract_links(
        &self,
        _url: &str,
        _links: &[LinkContext],
        _verdict: &PageVerdict,
    ) -> Vec<LinkSuggestion> {
        Vec::new()
    }
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint
pub struct LlmClassifier {
    endpoint: String,
    model: String,
    client: Client,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            client,
        })
    }

    /// One chat call; returns the assistant message content
    async fn chat(&self, system: &str, user: &str) -> Option<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.2,
            "stream": false,
        });

        let response = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Classifier request failed");
                return None;
            }
        };

        let payload: serde_json::Value = match response.error_for_status() {
            Ok(r) => match r.json().await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Classifier response was not JSON");
                    return None;
                }
            },
            Err(e) => {
                warn!(error = %e, "Classifier returned error status");
                return None;
            }
        };

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify_page(&self, url: &str, title: &str, text: &str) -> PageVerdict {
        let system = "You analyze pages from government data portals and registries. \
                      You identify open-data sources, API endpoints, and registries. \
                      Always answer with valid JSON and nothing else.";
        let user = format!(
            "Analyze this page and decide whether it exposes or leads to structured data.\n\
             URL: {}\nTitle: {}\nPage text (truncated):\n{}\n\n\
             Answer with JSON: {{\"page_type\": \"data_portal|registry|api_docs|search_page|other\", \
             \"relevance\": 1-10, \"crawl_priority\": 1-10, \"is_data_source\": true|false}}",
            url,
            title,
            truncate(text, 5000),
        );

        let Some(content) = self.chat(system, &user).await else {
            return PageVerdict::neutral();
        };

        match parse_json_payload::<PageVerdict>(&content) {
            Some(verdict) => {
                debug!(url, page_type = %verdict.page_type, relevance = verdict.relevance,
                       "Classified page");
                verdict
            }
            None => {
                warn!(url, "Classifier returned unparseable verdict");
                PageVerdict::neutral()
            }
        }
    }

    async fn extract_links(
        &self,
        url: &str,
        links: &[LinkContext],
        verdict: &PageVerdict,
    ) -> Vec<LinkSuggestion> {
        let links_context: Vec<String> = links
            .iter()
            .take(50)
            .map(|l| format!("'{}' -> {}", l.text, l.href))
            .collect();

        let system = "You pick out links that lead to data sources: registries, \
                      API endpoints, data files, and RSS/Atom feeds. \
                      Always answer with a valid JSON array and nothing else.";
        let user = format!(
            "Page: {} (type: {}, relevance: {}/10)\n\
             From these links, select the ones leading to registries, APIs, data files \
             (.csv/.json/.xml), API documentation, or RSS/Atom feeds. Feeds get priority 2-3.\n\
             Links:\n{}\n\n\
             Answer with a JSON array of \
             {{\"url\": \"...\", \"priority\": 1-10, \"source_type\": \"...\", \"confidence\": 1-10}}. \
             Return [] when nothing qualifies.",
            url,
            verdict.page_type,
            verdict.relevance,
            links_context.join("\n"),
        );

        let Some(content) = self.chat(system, &user).await else {
            return Vec::new();
        };

        parse_json_payload::<Vec<LinkSuggestion>>(&content).unwrap_or_default()
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parses a JSON payload out of a model reply
///
/// Models wrap JSON in markdown fences or prose more often than not; strip
/// the fence, then fall back to the outermost bracketed span.
fn parse_json_payload<T: serde::de::DeserializeOwned>(content: &str) -> Option<T> {
    let trimmed = content.trim();

    let unfenced = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (unfenced.find(open), unfenced.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&unfenced[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_verdict() {
        let verdict = PageVerdict::neutral();
        assert_eq!(verdict.relevance, NEUTRAL_RELEVANCE);
        assert!(!verdict.is_data_source);
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict: PageVerdict = parse_json_payload(
            r#"{"page_type": "registry", "relevance": 8, "crawl_priority": 2, "is_data_source": true}"#,
        )
        .unwrap();
        assert_eq!(verdict.page_type, "registry");
        assert_eq!(verdict.relevance, 8);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"page_type\": \"other\", \"relevance\": 3, \
                       \"crawl_priority\": 7, \"is_data_source\": false}\n```";
        let verdict: PageVerdict = parse_json_payload(content).unwrap();
        assert_eq!(verdict.relevance, 3);
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let content = "Here is my analysis: [{\"url\": \"https://e/api\", \"priority\": 2}] done.";
        let links: Vec<LinkSuggestion> = parse_json_payload(content).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].priority, 2);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_json_payload::<PageVerdict>("not json at all").is_none());
    }

    #[tokio::test]
    async fn test_neutral_classifier_never_suggests_links() {
        let classifier = NeutralClassifier;
        let verdict = classifier.classify_page("https://e", "t", "body").await;
        assert_eq!(verdict.relevance, NEUTRAL_RELEVANCE);

        let links = classifier
            .extract_links(
                "https://e",
                &[LinkContext {
                    text: "data".to_string(),
                    href: "/data".to_string(),
                }],
                &verdict,
            )
            .await;
        assert!(links.is_empty());
    }
}
