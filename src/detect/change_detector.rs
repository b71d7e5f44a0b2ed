//! Incremental change detection
//!
//! Compares a fresh snapshot of a source against what storage holds and
//! appends created/updated/deleted events to the change log. Feed sources
//! get a specialized comparison: feeds are rolling windows, so an entry
//! falling out of the window is not a deletion, and a changed publication
//! timestamp alone counts as an update.

use crate::adapter::{make_adapter, AdapterSettings, FeedAdapter, SourceAdapter};
use crate::detect::diff::field_diff;
use crate::record::{canonical_hash, Record};
use crate::storage::{
    ChangeEvent, ChangeType, SourceRecord, SourceType, SqliteStorage, Storage,
};
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Window fetched from a feed when detecting changes; feeds carry only
/// their most recent entries, so one bounded read covers the whole feed
const FEED_DETECTION_WINDOW: u64 = 1000;

/// Detects created/updated/deleted records across sources
pub struct ChangeDetector {
    storage: Arc<Mutex<SqliteStorage>>,
    client: Client,
}

impl ChangeDetector {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, client: Client) -> Self {
        Self { storage, client }
    }

    /// Detects and logs changes for one source
    pub async fn detect_changes(&self, source_id: i64) -> Result<Vec<ChangeEvent>> {
        let source = {
            let storage = self.storage.lock().unwrap();
            storage.get_source(source_id)?
        };
        info!(source_id, url = %source.url, "Detecting changes");

        let current = if source.source_type == SourceType::Rss {
            let settings = AdapterSettings::from_metadata(source.metadata.as_ref())?;
            let feed = FeedAdapter::new(source.url.clone(), self.client.clone(), settings);
            // The snapshot is shared, so the probe costs no extra fetch
            if let Ok(feed_info) = feed.feed_info().await {
                info!(
                    source_id,
                    title = feed_info.title.as_deref().unwrap_or(""),
                    entries = feed_info.total_entries,
                    "Feed snapshot"
                );
            }
            feed.download_incremental(0, FEED_DETECTION_WINDOW).await?
        } else {
            let adapter = make_adapter(&source, &self.client)?;
            adapter.fetch_original_data().await?
        };

        if current.is_empty() {
            warn!(source_id, "Origin returned no data, skipping comparison");
            return Ok(Vec::new());
        }

        let saved = {
            let storage = self.storage.lock().unwrap();
            storage.get_records(source_id)?
        };

        let events = if source.source_type == SourceType::Rss {
            compare_feed(&source, &saved, &current)
        } else {
            compare_snapshots(&source, &saved, &current)
        };

        if !events.is_empty() {
            let counts = count_by_type(&events);
            info!(
                source_id,
                created = counts.0,
                updated = counts.1,
                deleted = counts.2,
                "Changes detected"
            );
            let mut storage = self.storage.lock().unwrap();
            storage.append_change_events(&events)?;
        }

        Ok(events)
    }

    /// Runs detection over every active source, isolating failures
    pub async fn detect_changes_all_sources(&self) -> Result<HashMap<i64, Vec<ChangeEvent>>> {
        let sources = {
            let storage = self.storage.lock().unwrap();
            storage.get_active_sources()?
        };
        info!(count = sources.len(), "Detecting changes across sources");

        let mut all_changes = HashMap::new();
        for source in sources {
            match self.detect_changes(source.id).await {
                Ok(events) => {
                    all_changes.insert(source.id, events);
                }
                Err(e) => {
                    error!(source_id = source.id, error = %e, "Change detection failed");
                    all_changes.insert(source.id, Vec::new());
                }
            }
        }

        let total: usize = all_changes.values().map(Vec::len).sum();
        info!(total, sources = all_changes.len(), "Change detection pass finished");
        Ok(all_changes)
    }

    /// Change events logged in the last `hours`, optionally for one source
    pub fn get_recent_changes(
        &self,
        source_id: Option<i64>,
        hours: i64,
    ) -> Result<Vec<ChangeEvent>> {
        let since = Utc::now() - chrono::Duration::hours(hours);
        let storage = self.storage.lock().unwrap();
        Ok(storage.get_changes_since(source_id, since)?)
    }
}

/// Generic snapshot comparison keyed by natural key (content hash fallback)
fn compare_snapshots(
    source: &SourceRecord,
    saved: &[Record],
    current: &[Record],
) -> Vec<ChangeEvent> {
    let saved_by_key: HashMap<String, &Record> =
        saved.iter().map(|r| (r.key_or_hash(), r)).collect();

    let mut events = Vec::new();
    let mut current_keys = HashSet::new();

    for record in current {
        let key = record.key_or_hash();
        current_keys.insert(key.clone());

        match saved_by_key.get(&key) {
            None => events.push(created_event(source, key, record)),
            Some(old) => {
                let old_hash = canonical_hash(old);
                let new_hash = canonical_hash(record);
                if old_hash != new_hash {
                    events.push(updated_event(source, key, old, record, old_hash, new_hash));
                }
            }
        }
    }

    for (key, record) in &saved_by_key {
        if !current_keys.contains(key) {
            events.push(ChangeEvent {
                document_id: key.clone(),
                change_type: ChangeType::Deleted,
                old_data: Some((*record).clone()),
                new_data: None,
                old_content_hash: Some(canonical_hash(record)),
                new_content_hash: None,
                field_diff: Default::default(),
                source_id: source.id,
                source_url: source.url.clone(),
                detected_at: Utc::now().to_rfc3339(),
            });
        }
    }

    events
}

/// Feed comparison: guid/id/link identity, no deletions, publication
/// timestamp changes count as updates
fn compare_feed(source: &SourceRecord, saved: &[Record], current: &[Record]) -> Vec<ChangeEvent> {
    let saved_by_key: HashMap<String, &Record> = saved
        .iter()
        .filter_map(|r| r.feed_key().map(|key| (key, r)))
        .collect();

    let mut events = Vec::new();
    for record in current {
        let Some(key) = record.feed_key() else {
            continue;
        };

        match saved_by_key.get(&key) {
            None => events.push(created_event(source, key, record)),
            Some(old) => {
                let published_changed = old.get("published") != record.get("published");
                let old_hash = canonical_hash(old);
                let new_hash = canonical_hash(record);
                if published_changed || old_hash != new_hash {
                    events.push(updated_event(source, key, old, record, old_hash, new_hash));
                }
            }
        }
    }

    events
}

fn created_event(source: &SourceRecord, key: String, record: &Record) -> ChangeEvent {
    ChangeEvent {
        document_id: key,
        change_type: ChangeType::Created,
        old_data: None,
        new_data: Some(record.clone()),
        old_content_hash: None,
        new_content_hash: Some(canonical_hash(record)),
        field_diff: Default::default(),
        source_id: source.id,
        source_url: source.url.clone(),
        detected_at: Utc::now().to_rfc3339(),
    }
}

fn updated_event(
    source: &SourceRecord,
    key: String,
    old: &Record,
    new: &Record,
    old_hash: String,
    new_hash: String,
) -> ChangeEvent {
    ChangeEvent {
        document_id: key,
        change_type: ChangeType::Updated,
        old_data: Some(old.clone()),
        new_data: Some(new.clone()),
        old_content_hash: Some(old_hash),
        new_content_hash: Some(new_hash),
        field_diff: field_diff(old, new),
        source_id: source.id,
        source_url: source.url.clone(),
        detected_at: Utc::now().to_rfc3339(),
    }
}

fn count_by_type(events: &[ChangeEvent]) -> (usize, usize, usize) {
    let created = events
        .iter()
        .filter(|e| e.change_type == ChangeType::Created)
        .count();
    let updated = events
        .iter()
        .filter(|e| e.change_type == ChangeType::Updated)
        .count();
    let deleted = events
        .iter()
        .filter(|e| e.change_type == ChangeType::Deleted)
        .count();
    (created, updated, deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceStatus;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value)
    }

    fn source() -> SourceRecord {
        SourceRecord {
            id: 1,
            url: "https://api.example.gov.ua/registry".to_string(),
            source_type: SourceType::Api,
            domain: "api.example.gov.ua".to_string(),
            status: SourceStatus::Completed,
            downloaded_records: 0,
            total_records: None,
            retry_count: 0,
            error_message: None,
            last_successful_download: None,
            metadata: None,
            created_at: "2026-08-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_new_records_are_created_events() {
        let saved = vec![record(json!({"id": "a", "title": "one"}))];
        let current = vec![
            record(json!({"id": "a", "title": "one"})),
            record(json!({"id": "b", "title": "two"})),
        ];

        let events = compare_snapshots(&source(), &saved, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::Created);
        assert_eq!(events[0].document_id, "b");
        assert!(events[0].old_content_hash.is_none());
        assert!(events[0].new_content_hash.is_some());
    }

    #[test]
    fn test_changed_record_yields_updated_with_diff() {
        let saved = vec![record(json!({"id": "a", "title": "x"}))];
        let current = vec![record(json!({"id": "a", "title": "y"}))];

        let events = compare_snapshots(&source(), &saved, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::Updated);
        let change = &events[0].field_diff["title"];
        assert_eq!(change.old, Some(json!("x")));
        assert_eq!(change.new, Some(json!("y")));
    }

    #[test]
    fn test_volatile_fields_do_not_trigger_updates() {
        let saved = vec![record(json!({"id": "a", "title": "x",
                                        "downloaded_at": "2026-01-01T00:00:00Z"}))];
        let current = vec![record(json!({"id": "a", "title": "x",
                                          "downloaded_at": "2026-08-01T00:00:00Z"}))];

        let events = compare_snapshots(&source(), &saved, &current);
        assert!(events.is_empty());
    }

    #[test]
    fn test_vanished_record_is_deleted_event() {
        let saved = vec![record(json!({"id": "gone", "title": "old"}))];
        let current = vec![record(json!({"id": "here", "title": "new"}))];

        let events = compare_snapshots(&source(), &saved, &current);
        assert_eq!(events.len(), 2);
        let deleted = events
            .iter()
            .find(|e| e.change_type == ChangeType::Deleted)
            .unwrap();
        assert_eq!(deleted.document_id, "gone");
        assert!(deleted.new_content_hash.is_none());
    }

    #[test]
    fn test_feed_never_reports_deletions() {
        let saved = vec![record(json!({"guid": "old-entry", "title": "fell out"}))];
        let current = vec![record(json!({"guid": "new-entry", "title": "fresh"}))];

        let events = compare_feed(&source(), &saved, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::Created);
    }

    #[test]
    fn test_feed_published_change_is_update() {
        let saved = vec![record(json!({
            "guid": "e1", "title": "t", "published": "2026-08-01T00:00:00Z"
        }))];
        let current = vec![record(json!({
            "guid": "e1", "title": "t", "published": "2026-08-02T00:00:00Z"
        }))];

        let events = compare_feed(&source(), &saved, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::Updated);
        assert!(events[0].field_diff.contains_key("published"));
    }

    #[test]
    fn test_unchanged_snapshot_is_quiet() {
        let rows = vec![
            record(json!({"id": "a", "title": "one"})),
            record(json!({"id": "b", "title": "two"})),
        ];
        let events = compare_snapshots(&source(), &rows, &rows.clone());
        assert!(events.is_empty());
    }
}
