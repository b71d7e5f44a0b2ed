//! Storage trait and error types

use crate::record::Record;
use crate::state::SourceStatus;
use crate::storage::{
    ChangeEvent, DatasetVersionRecord, FingerprintRecord, SourceRecord, SourceType,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Source not found: {0}")]
    SourceNotFound(i64),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SourceStatus,
        to: SourceStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Defines the narrow keyed get/put surface the pipeline depends on.
pub trait Storage {
    // ===== Source Management =====

    /// Registers a source, or returns the existing id for the same URL
    fn create_source(
        &mut self,
        url: &str,
        source_type: SourceType,
        domain: &str,
        metadata: Option<&Value>,
    ) -> StorageResult<i64>;

    /// Gets a source by ID
    fn get_source(&self, source_id: i64) -> StorageResult<SourceRecord>;

    /// Gets a source by URL
    fn get_source_by_url(&self, url: &str) -> StorageResult<Option<SourceRecord>>;

    /// Gets every source not in the `failed` state
    fn get_active_sources(&self) -> StorageResult<Vec<SourceRecord>>;

    /// Updates a source's status; the transition must be legal
    ///
    /// Supplying an error message also increments the retry counter.
    fn update_source_status(
        &mut self,
        source_id: i64,
        status: SourceStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Persists the download checkpoint (count of durably stored records)
    fn update_progress(&mut self, source_id: i64, downloaded_records: u64) -> StorageResult<()>;

    /// Stores a refreshed total-records estimate
    fn set_total_estimate(&mut self, source_id: i64, total: u64) -> StorageResult<()>;

    // ===== Raw Records =====

    /// Upserts a batch of records for a source, keyed by natural key
    fn put_records(&mut self, source_id: i64, records: &[Record]) -> StorageResult<()>;

    /// Loads all stored records for a source
    fn get_records(&self, source_id: i64) -> StorageResult<Vec<Record>>;

    /// Counts stored records for a source
    fn count_records(&self, source_id: i64) -> StorageResult<u64>;

    // ===== Fingerprint Log (append-only) =====

    fn append_fingerprints(&mut self, fingerprints: &[FingerprintRecord]) -> StorageResult<()>;

    fn get_fingerprints(&self, source_id: i64) -> StorageResult<Vec<FingerprintRecord>>;

    // ===== Change-Event Log (append-only) =====

    fn append_change_events(&mut self, events: &[ChangeEvent]) -> StorageResult<()>;

    /// Change events detected after `since`, optionally limited to one source
    fn get_changes_since(
        &self,
        source_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<ChangeEvent>>;

    // ===== Dataset Versions =====

    fn create_dataset_version(
        &mut self,
        name: &str,
        parent_version: Option<i64>,
        sample_count: u64,
    ) -> StorageResult<i64>;

    fn latest_dataset_version(&self) -> StorageResult<Option<DatasetVersionRecord>>;
}
