//! SQLite storage implementation

use crate::record::Record;
use crate::state::SourceStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ChangeEvent, ChangeType, DatasetVersionRecord, FieldChange, FingerprintRecord, SourceRecord,
    SourceType,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
        let source_type: String = row.get(2)?;
        let status: String = row.get(4)?;
        let total: Option<i64> = row.get(6)?;
        let metadata: Option<String> = row.get(10)?;

        Ok(SourceRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            source_type: SourceType::from_db_string(&source_type)
                .unwrap_or(SourceType::Api),
            domain: row.get(3)?,
            status: SourceStatus::from_db_string(&status).unwrap_or(SourceStatus::Pending),
            downloaded_records: row.get::<_, i64>(5)? as u64,
            total_records: total.map(|t| t as u64),
            retry_count: row.get::<_, i64>(7)? as u32,
            error_message: row.get(8)?,
            last_successful_download: row.get(9)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get(11)?,
        })
    }
}

const SOURCE_COLUMNS: &str = "id, url, source_type, domain, status, downloaded_records, \
     total_records, retry_count, error_message, last_successful_download, metadata, created_at";

impl Storage for SqliteStorage {
    // ===== Source Management =====

    fn create_source(
        &mut self,
        url: &str,
        source_type: SourceType,
        domain: &str,
        metadata: Option<&Value>,
    ) -> StorageResult<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM sources WHERE url = ?1", params![url], |r| {
                r.get(0)
            })
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO sources (url, source_type, domain, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![url, source_type.to_db_string(), domain, metadata_json, now],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_source(&self, source_id: i64) -> StorageResult<SourceRecord> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sources WHERE id = ?1",
            SOURCE_COLUMNS
        ))?;

        stmt.query_row(params![source_id], Self::row_to_source)
            .optional()?
            .ok_or(StorageError::SourceNotFound(source_id))
    }

    fn get_source_by_url(&self, url: &str) -> StorageResult<Option<SourceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sources WHERE url = ?1",
            SOURCE_COLUMNS
        ))?;

        Ok(stmt.query_row(params![url], Self::row_to_source).optional()?)
    }

    fn get_active_sources(&self) -> StorageResult<Vec<SourceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sources WHERE status != 'failed' ORDER BY created_at",
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map([], Self::row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn update_source_status(
        &mut self,
        source_id: i64,
        status: SourceStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let current = self.get_source(source_id)?;
        if current.status != status && !current.status.can_transition(status) {
            return Err(StorageError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        if let Some(message) = error_message {
            self.conn.execute(
                "UPDATE sources SET status = ?1, error_message = ?2,
                 retry_count = retry_count + 1, updated_at = ?3 WHERE id = ?4",
                params![status.to_db_string(), message, now, source_id],
            )?;
        } else {
            self.conn.execute(
                "UPDATE sources SET status = ?1, error_message = NULL, updated_at = ?2
                 WHERE id = ?3",
                params![status.to_db_string(), now, source_id],
            )?;
        }

        Ok(())
    }

    fn update_progress(&mut self, source_id: i64, downloaded_records: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sources SET downloaded_records = ?1, last_successful_download = ?2,
             updated_at = ?2 WHERE id = ?3",
            params![downloaded_records as i64, now, source_id],
        )?;
        Ok(())
    }

    fn set_total_estimate(&mut self, source_id: i64, total: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sources SET total_records = ?1, updated_at = ?2 WHERE id = ?3",
            params![total as i64, now, source_id],
        )?;
        Ok(())
    }

    // ===== Raw Records =====

    fn put_records(&mut self, source_id: i64, records: &[Record]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (source_id, record_key, data, downloaded_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (source_id, record_key) DO UPDATE SET
                     data = excluded.data, downloaded_at = excluded.downloaded_at",
            )?;
            for record in records {
                let key = record.key_or_hash();
                let data = serde_json::to_string(record)?;
                stmt.execute(params![source_id, key, data, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_records(&self, source_id: i64) -> StorageResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM records WHERE source_id = ?1 ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map(params![source_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for data in rows {
            records.push(serde_json::from_str(&data)?);
        }
        Ok(records)
    }

    fn count_records(&self, source_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Fingerprint Log =====

    fn append_fingerprints(&mut self, fingerprints: &[FingerprintRecord]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fingerprints
                 (source_id, record_id, content_hash, verification_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for fp in fingerprints {
                stmt.execute(params![
                    fp.source_id,
                    fp.record_id,
                    fp.content_hash,
                    fp.verification_status,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_fingerprints(&self, source_id: i64) -> StorageResult<Vec<FingerprintRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, record_id, content_hash, verification_status
             FROM fingerprints WHERE source_id = ?1 ORDER BY id",
        )?;

        let fingerprints = stmt
            .query_map(params![source_id], |row| {
                Ok(FingerprintRecord {
                    source_id: row.get(0)?,
                    record_id: row.get(1)?,
                    content_hash: row.get(2)?,
                    verification_status: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fingerprints)
    }

    // ===== Change-Event Log =====

    fn append_change_events(&mut self, events: &[ChangeEvent]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO change_events
                 (document_id, source_id, source_url, change_type, old_data, new_data,
                  old_content_hash, new_content_hash, field_diff, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for event in events {
                let old_data = event.old_data.as_ref().map(serde_json::to_string).transpose()?;
                let new_data = event.new_data.as_ref().map(serde_json::to_string).transpose()?;
                let field_diff = if event.field_diff.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&event.field_diff)?)
                };
                stmt.execute(params![
                    event.document_id,
                    event.source_id,
                    event.source_url,
                    event.change_type.to_db_string(),
                    old_data,
                    new_data,
                    event.old_content_hash,
                    event.new_content_hash,
                    field_diff,
                    event.detected_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_changes_since(
        &self,
        source_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ChangeEvent>> {
        let since = since.to_rfc3339();
        let mut stmt = self.conn.prepare(
            "SELECT document_id, source_id, source_url, change_type, old_data, new_data,
                    old_content_hash, new_content_hash, field_diff, detected_at
             FROM change_events
             WHERE detected_at > ?1 AND (?2 IS NULL OR source_id = ?2)
             ORDER BY detected_at DESC",
        )?;

        let rows = stmt
            .query_map(params![since, source_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (
            document_id,
            source_id,
            source_url,
            change_type,
            old_data,
            new_data,
            old_hash,
            new_hash,
            field_diff,
            detected_at,
        ) in rows
        {
            events.push(ChangeEvent {
                document_id,
                change_type: ChangeType::from_db_string(&change_type)
                    .unwrap_or(ChangeType::Updated),
                old_data: old_data.map(|d| serde_json::from_str(&d)).transpose()?,
                new_data: new_data.map(|d| serde_json::from_str(&d)).transpose()?,
                old_content_hash: old_hash,
                new_content_hash: new_hash,
                field_diff: field_diff
                    .map(|d| serde_json::from_str::<BTreeMap<String, FieldChange>>(&d))
                    .transpose()?
                    .unwrap_or_default(),
                source_id,
                source_url,
                detected_at,
            });
        }
        Ok(events)
    }

    // ===== Dataset Versions =====

    fn create_dataset_version(
        &mut self,
        name: &str,
        parent_version: Option<i64>,
        sample_count: u64,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO dataset_versions (name, parent_version, sample_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, parent_version, sample_count as i64, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_dataset_version(&self) -> StorageResult<Option<DatasetVersionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, parent_version, sample_count, created_at
             FROM dataset_versions ORDER BY id DESC LIMIT 1",
        )?;

        Ok(stmt
            .query_row([], |row| {
                Ok(DatasetVersionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_version: row.get(2)?,
                    sample_count: row.get::<_, i64>(3)? as u64,
                    created_at: row.get(4)?,
                })
            })
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value)
    }

    fn storage_with_source() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_source(
                "https://api.example.gov.ua/registry",
                SourceType::Api,
                "api.example.gov.ua",
                None,
            )
            .unwrap();
        (storage, id)
    }

    #[test]
    fn test_create_source_idempotent_by_url() {
        let (mut storage, id) = storage_with_source();
        let again = storage
            .create_source(
                "https://api.example.gov.ua/registry",
                SourceType::Api,
                "api.example.gov.ua",
                None,
            )
            .unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn test_new_source_defaults() {
        let (storage, id) = storage_with_source();
        let source = storage.get_source(id).unwrap();

        assert_eq!(source.status, SourceStatus::Pending);
        assert_eq!(source.downloaded_records, 0);
        assert_eq!(source.total_records, None);
        assert_eq!(source.retry_count, 0);
    }

    #[test]
    fn test_get_missing_source() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_source(99),
            Err(StorageError::SourceNotFound(99))
        ));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let metadata = json!({"pagination_params": {"offset": "skip", "limit": "take"}});
        let id = storage
            .create_source(
                "https://api.example.gov.ua/v2",
                SourceType::Api,
                "api.example.gov.ua",
                Some(&metadata),
            )
            .unwrap();

        let source = storage.get_source(id).unwrap();
        assert_eq!(source.metadata, Some(metadata));
    }

    #[test]
    fn test_status_transition_enforced() {
        let (mut storage, id) = storage_with_source();

        // pending -> completed is illegal
        let result = storage.update_source_status(id, SourceStatus::Completed, None);
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition { .. })
        ));

        storage
            .update_source_status(id, SourceStatus::Downloading, None)
            .unwrap();
        storage
            .update_source_status(id, SourceStatus::Completed, None)
            .unwrap();
        assert_eq!(
            storage.get_source(id).unwrap().status,
            SourceStatus::Completed
        );
    }

    #[test]
    fn test_error_message_increments_retry_count() {
        let (mut storage, id) = storage_with_source();
        storage
            .update_source_status(id, SourceStatus::Downloading, None)
            .unwrap();
        storage
            .update_source_status(id, SourceStatus::Failed, Some("connection refused"))
            .unwrap();

        let source = storage.get_source(id).unwrap();
        assert_eq!(source.retry_count, 1);
        assert_eq!(
            source.error_message.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_active_sources_excludes_failed() {
        let (mut storage, id) = storage_with_source();
        let other = storage
            .create_source(
                "https://files.example.gov.ua/data.csv",
                SourceType::File,
                "files.example.gov.ua",
                None,
            )
            .unwrap();

        storage
            .update_source_status(id, SourceStatus::Downloading, None)
            .unwrap();
        storage
            .update_source_status(id, SourceStatus::Failed, Some("boom"))
            .unwrap();

        let active = storage.get_active_sources().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, other);
    }

    #[test]
    fn test_put_records_upserts_by_key() {
        let (mut storage, id) = storage_with_source();

        storage
            .put_records(id, &[record(json!({"guid": "a", "title": "one"}))])
            .unwrap();
        storage
            .put_records(id, &[record(json!({"guid": "a", "title": "two"}))])
            .unwrap();

        let records = storage.get_records(id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("title"), Some(&json!("two")));
    }

    #[test]
    fn test_progress_checkpoint() {
        let (mut storage, id) = storage_with_source();
        storage.update_progress(id, 250).unwrap();

        let source = storage.get_source(id).unwrap();
        assert_eq!(source.downloaded_records, 250);
        assert!(source.last_successful_download.is_some());
    }

    #[test]
    fn test_fingerprint_log_appends() {
        let (mut storage, id) = storage_with_source();
        let fp = FingerprintRecord {
            source_id: id,
            record_id: "a".to_string(),
            content_hash: "deadbeef".to_string(),
            verification_status: "pending".to_string(),
        };
        storage.append_fingerprints(&[fp.clone()]).unwrap();
        storage.append_fingerprints(&[fp]).unwrap();

        // Append-only: duplicates are separate log entries
        assert_eq!(storage.get_fingerprints(id).unwrap().len(), 2);
    }

    #[test]
    fn test_change_event_roundtrip() {
        let (mut storage, id) = storage_with_source();
        let mut diff = BTreeMap::new();
        diff.insert(
            "title".to_string(),
            FieldChange {
                old: Some(json!("x")),
                new: Some(json!("y")),
            },
        );
        let event = ChangeEvent {
            document_id: "doc-1".to_string(),
            change_type: ChangeType::Updated,
            old_data: Some(record(json!({"title": "x"}))),
            new_data: Some(record(json!({"title": "y"}))),
            old_content_hash: Some("aaa".to_string()),
            new_content_hash: Some("bbb".to_string()),
            field_diff: diff.clone(),
            source_id: id,
            source_url: "https://api.example.gov.ua/registry".to_string(),
            detected_at: Utc::now().to_rfc3339(),
        };

        storage.append_change_events(&[event]).unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let changes = storage.get_changes_since(Some(id), since).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Updated);
        assert_eq!(changes[0].field_diff, diff);
    }

    #[test]
    fn test_changes_since_filters_by_time() {
        let (mut storage, id) = storage_with_source();
        let event = ChangeEvent {
            document_id: "doc-1".to_string(),
            change_type: ChangeType::Created,
            old_data: None,
            new_data: Some(record(json!({"title": "x"}))),
            old_content_hash: None,
            new_content_hash: Some("bbb".to_string()),
            field_diff: BTreeMap::new(),
            source_id: id,
            source_url: "u".to_string(),
            detected_at: Utc::now().to_rfc3339(),
        };
        storage.append_change_events(&[event]).unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(storage.get_changes_since(None, future).unwrap().is_empty());
    }

    #[test]
    fn test_dataset_versions() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.latest_dataset_version().unwrap().is_none());

        let base = storage.create_dataset_version("base", None, 1000).unwrap();
        let inc = storage
            .create_dataset_version("incremental-1", Some(base), 150)
            .unwrap();

        let latest = storage.latest_dataset_version().unwrap().unwrap();
        assert_eq!(latest.id, inc);
        assert_eq!(latest.parent_version, Some(base));
        assert_eq!(latest.sample_count, 150);
    }
}
