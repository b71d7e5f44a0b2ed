//! Source adapters
//!
//! An adapter knows how to pull records out of one kind of origin: a
//! paginated REST API, a whole-file download (CSV/JSON), an HTML table with
//! page-based pagination, or an RSS/Atom feed. All adapters expose the same
//! offset/limit window so the download manager can checkpoint and resume
//! without knowing the transport.

mod api;
mod feed;
mod file;
mod web;

pub use api::ApiAdapter;
pub use feed::{FeedAdapter, FeedInfo};
pub use file::FileAdapter;
pub use web::WebAdapter;

use crate::record::Record;
use crate::storage::{SourceRecord, SourceType};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;

/// Batch size used when draining a source in full
const FULL_FETCH_BATCH: u64 = 1000;

/// Uniform record-fetching interface over heterogeneous origins
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Best-effort estimate of the total record count
    ///
    /// Returns `Ok(None)` when the origin gives no usable signal; an
    /// unknown total is not an error.
    async fn estimate_total(&self) -> Result<Option<u64>>;

    /// Fetches one window of records starting at `offset`
    ///
    /// May return fewer than `limit` records; an empty result means the
    /// origin is exhausted at this offset.
    async fn download_incremental(&self, offset: u64, limit: u64) -> Result<Vec<Record>>;

    /// Drains the origin in full, batch by batch
    ///
    /// Stops on the first empty or short batch.
    async fn fetch_original_data(&self) -> Result<Vec<Record>> {
        let mut all = Vec::new();
        let mut offset = 0u64;

        loop {
            let batch = self.download_incremental(offset, FULL_FETCH_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len() as u64;
            let short = (batch.len() as u64) < FULL_FETCH_BATCH;
            all.extend(batch);
            if short {
                break;
            }
        }

        Ok(all)
    }
}

/// Per-source adapter configuration, carried in source metadata
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdapterSettings {
    #[serde(default)]
    pub auth: Option<AuthSettings>,
    #[serde(default)]
    pub pagination_params: Option<PaginationParams>,
}

impl AdapterSettings {
    /// Parses settings out of a source's metadata JSON
    ///
    /// Unknown metadata keys are ignored so metadata can carry fields for
    /// other subsystems.
    pub fn from_metadata(metadata: Option<&serde_json::Value>) -> Result<Self> {
        match metadata {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Self::default()),
        }
    }
}

/// Authentication material for an origin
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    /// Sent as `Authorization: Bearer <token>`
    pub token: Option<String>,
    /// Sent as `X-API-Key`
    pub api_key: Option<String>,
}

impl AuthSettings {
    /// Attaches auth headers to a request; token wins over api_key
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token)
        } else if let Some(api_key) = &self.api_key {
            request.header("X-API-Key", api_key)
        } else {
            request
        }
    }
}

/// Query-parameter names an API uses for offset/limit pagination
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_offset_param")]
    pub offset: String,
    #[serde(default = "default_limit_param")]
    pub limit: String,
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            offset: default_offset_param(),
            limit: default_limit_param(),
        }
    }
}

/// Builds the HTTP client shared by all adapters
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("Tidewatch/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// Constructs the adapter matching a source's transport tag
pub fn make_adapter(source: &SourceRecord, client: &Client) -> Result<Box<dyn SourceAdapter>> {
    let settings = AdapterSettings::from_metadata(source.metadata.as_ref())?;

    Ok(match source.source_type {
        SourceType::Api => Box::new(ApiAdapter::new(
            source.url.clone(),
            client.clone(),
            settings,
        )),
        SourceType::File => Box::new(FileAdapter::new(source.url.clone(), client.clone())),
        SourceType::Web => Box::new(WebAdapter::new(source.url.clone(), client.clone())),
        SourceType::Rss => Box::new(FeedAdapter::new(
            source.url.clone(),
            client.clone(),
            settings,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_from_empty_metadata() {
        let settings = AdapterSettings::from_metadata(None).unwrap();
        assert!(settings.auth.is_none());
        assert!(settings.pagination_params.is_none());
    }

    #[test]
    fn test_settings_parse_pagination_names() {
        let metadata = json!({
            "pagination_params": {"offset": "skip", "limit": "take"}
        });
        let settings = AdapterSettings::from_metadata(Some(&metadata)).unwrap();
        let pagination = settings.pagination_params.unwrap();
        assert_eq!(pagination.offset, "skip");
        assert_eq!(pagination.limit, "take");
    }

    #[test]
    fn test_settings_defaults_fill_partial_pagination() {
        let metadata = json!({"pagination_params": {"offset": "start"}});
        let settings = AdapterSettings::from_metadata(Some(&metadata)).unwrap();
        let pagination = settings.pagination_params.unwrap();
        assert_eq!(pagination.offset, "start");
        assert_eq!(pagination.limit, "limit");
    }

    #[test]
    fn test_settings_ignore_foreign_keys() {
        let metadata = json!({"discovered_by": "crawler", "auth": {"token": "t"}});
        let settings = AdapterSettings::from_metadata(Some(&metadata)).unwrap();
        assert_eq!(settings.auth.unwrap().token.as_deref(), Some("t"));
    }
}
