//! Static file adapter
//!
//! A file origin has no server-side pagination, so the whole file is
//! downloaded once, parsed, cached for the adapter's lifetime, and windows
//! are sliced out of the cached rows.

use crate::adapter::SourceAdapter;
use crate::record::Record;
use crate::{Result, TideError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// File format, detected from the URL or the Content-Type header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    Json,
    Xml,
}

/// Adapter for whole-file origins (CSV, JSON)
pub struct FileAdapter {
    url: String,
    client: Client,
    cache: OnceCell<Vec<Record>>,
}

impl FileAdapter {
    pub fn new(url: String, client: Client) -> Self {
        Self {
            url,
            client,
            cache: OnceCell::new(),
        }
    }

    fn format_from_extension(url: &str) -> Option<FileFormat> {
        let url = url.to_lowercase();
        let path = url.split(['?', '#']).next().unwrap_or(&url);
        if path.ends_with(".csv") {
            Some(FileFormat::Csv)
        } else if path.ends_with(".json") {
            Some(FileFormat::Json)
        } else if path.ends_with(".xml") {
            Some(FileFormat::Xml)
        } else {
            None
        }
    }

    fn format_from_content_type(content_type: &str) -> Option<FileFormat> {
        let content_type = content_type.to_lowercase();
        if content_type.contains("csv") {
            Some(FileFormat::Csv)
        } else if content_type.contains("json") {
            Some(FileFormat::Json)
        } else if content_type.contains("xml") {
            Some(FileFormat::Xml)
        } else {
            None
        }
    }

    /// Resolves the file format: extension first, then a HEAD probe,
    /// defaulting to JSON
    async fn detect_format(&self) -> FileFormat {
        if let Some(format) = Self::format_from_extension(&self.url) {
            return format;
        }

        if let Ok(response) = self.client.head(&self.url).send().await {
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if let Some(format) = Self::format_from_content_type(content_type) {
                return format;
            }
        }

        FileFormat::Json
    }

    async fn load(&self) -> Result<&Vec<Record>> {
        self.cache
            .get_or_try_init(|| async {
                let format = self.detect_format().await;

                let response = self
                    .client
                    .get(&self.url)
                    .send()
                    .await
                    .map_err(|source| TideError::Http {
                        url: self.url.clone(),
                        source,
                    })?
                    .error_for_status()
                    .map_err(|source| TideError::Http {
                        url: self.url.clone(),
                        source,
                    })?;

                let content = response.text().await?;
                let records = match format {
                    FileFormat::Csv => parse_csv(&content)?,
                    FileFormat::Json => parse_json(&content)?,
                    FileFormat::Xml => {
                        warn!(url = %self.url, "XML files are not supported, treating as empty");
                        Vec::new()
                    }
                };

                debug!(url = %self.url, count = records.len(), ?format, "Loaded file");
                Ok(records)
            })
            .await
    }
}

fn parse_csv(content: &str) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| TideError::Download {
            source_id: 0,
            message: format!("CSV header parse error: {}", e),
        })?
        .clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| TideError::Download {
            source_id: 0,
            message: format!("CSV row parse error: {}", e),
        })?;
        let mut fields = serde_json::Map::new();
        for (header, value) in headers.iter().zip(row.iter()) {
            fields.insert(header.to_string(), Value::String(value.to_string()));
        }
        records.push(Record::new(fields));
    }
    Ok(records)
}

fn parse_json(content: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(content)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
        other => vec![Record::from_value(other)],
    })
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    async fn estimate_total(&self) -> Result<Option<u64>> {
        Ok(Some(self.load().await?.len() as u64))
    }

    async fn download_incremental(&self, offset: u64, limit: u64) -> Result<Vec<Record>> {
        let data = self.load().await?;
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(limit as usize).min(data.len());
        Ok(data[offset..end].to_vec())
    }
}
