//! HTML table adapter
//!
//! Scrapes tabular data out of paginated web pages. Pagination is expressed
//! with `page`/`per_page` query parameters; each table row becomes a record
//! with positional `column_N` fields.

use crate::adapter::SourceAdapter;
use crate::record::Record;
use crate::{Result, TideError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Adapter for HTML pages carrying data tables
pub struct WebAdapter {
    url: String,
    client: Client,
}

impl WebAdapter {
    pub fn new(url: String, client: Client) -> Self {
        Self { url, client }
    }
}

/// Extracts up to `limit` table rows from an HTML document
///
/// Header rows (the first `tr` of each table) are skipped; cells map to
/// `column_0..column_N` in document order.
fn extract_table_rows(html: &str, limit: u64) -> Vec<Record> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    let (Ok(table_selector), Ok(row_selector), Ok(cell_selector)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td, th"),
    ) else {
        return records;
    };

    for table in document.select(&table_selector) {
        for row in table.select(&row_selector).skip(1) {
            if records.len() as u64 >= limit {
                return records;
            }
            let mut fields = serde_json::Map::new();
            for (i, cell) in row.select(&cell_selector).enumerate() {
                let text = cell.text().collect::<String>().trim().to_string();
                fields.insert(format!("column_{}", i), Value::String(text));
            }
            if !fields.is_empty() {
                records.push(Record::new(fields));
            }
        }
    }

    records
}

#[async_trait]
impl SourceAdapter for WebAdapter {
    async fn estimate_total(&self) -> Result<Option<u64>> {
        // A page count is not knowable without walking every page.
        Ok(None)
    }

    async fn download_incremental(&self, offset: u64, limit: u64) -> Result<Vec<Record>> {
        let page = (offset / limit.max(1)) + 1;

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("page", page.to_string()),
                ("per_page", limit.to_string()),
            ])
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

        let html = response.text().await?;
        let records = extract_table_rows(&html, limit);
        debug!(url = %self.url, page, count = records.len(), "Scraped table page");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE_HTML: &str = r#"
        <html><body>
        <table>
            <tr><th>Name</th><th>Code</th></tr>
            <tr><td>Kyiv</td><td>UA-30</td></tr>
            <tr><td>Lviv</td><td>UA-46</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_header_row_skipped() {
        let records = extract_table_rows(TABLE_HTML, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("column_0"), Some(&json!("Kyiv")));
        assert_eq!(records[1].get("column_1"), Some(&json!("UA-46")));
    }

    #[test]
    fn test_limit_bounds_rows() {
        let records = extract_table_rows(TABLE_HTML, 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_page_without_tables() {
        let records = extract_table_rows("<html><body><p>No data</p></body></html>", 10);
        assert!(records.is_empty());
    }

    #[test]
    fn test_cell_text_is_trimmed() {
        let html = "<table><tr><th>H</th></tr><tr><td>  padded  </td></tr></table>";
        let records = extract_table_rows(html, 10);
        assert_eq!(records[0].get("column_0"), Some(&json!("padded")));
    }
}
