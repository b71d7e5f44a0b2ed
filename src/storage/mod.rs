//! Storage module for persisting pipeline state
//!
//! This module handles all database operations for the pipeline, including:
//! - Source registration and status lifecycle persistence
//! - Raw record storage keyed by natural key
//! - Append-only fingerprint and change-event logs
//! - Dataset-version metadata
//!
//! The rest of the crate depends only on the narrow [`Storage`] trait, not
//! on any specific schema engine.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::record::Record;
use crate::state::SourceStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport tag of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Api,
    File,
    Web,
    Rss,
}

impl SourceType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::File => "file",
            Self::Web => "web",
            Self::Rss => "rss",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "api" => Some(Self::Api),
            "file" => Some(Self::File),
            "web" => Some(Self::Web),
            "rss" => Some(Self::Rss),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A registered data source
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: i64,
    pub url: String,
    pub source_type: SourceType,
    pub domain: String,
    pub status: SourceStatus,
    /// Progress checkpoint: count of records durably persisted
    pub downloaded_records: u64,
    /// Best-effort total estimate; None means unknown
    pub total_records: Option<u64>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub last_successful_download: Option<String>,
    /// Opaque adapter configuration (auth, pagination parameter names)
    pub metadata: Option<Value>,
    pub created_at: String,
}

/// One entry in the append-only fingerprint log
#[derive(Debug, Clone)]
pub struct FingerprintRecord {
    pub source_id: i64,
    pub record_id: String,
    pub content_hash: String,
    pub verification_status: String,
}

/// Classification of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Field-level difference for an updated record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// An immutable record of a created/updated/deleted detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub document_id: String,
    pub change_type: ChangeType,
    pub old_data: Option<Record>,
    pub new_data: Option<Record>,
    pub old_content_hash: Option<String>,
    pub new_content_hash: Option<String>,
    /// Symmetric field-level difference; non-empty exactly for `updated`
    #[serde(default)]
    pub field_diff: std::collections::BTreeMap<String, FieldChange>,
    pub source_id: i64,
    pub source_url: String,
    pub detected_at: String,
}

/// Dataset-version bookkeeping entry
#[derive(Debug, Clone)]
pub struct DatasetVersionRecord {
    pub id: i64,
    pub name: String,
    pub parent_version: Option<i64>,
    pub sample_count: u64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_roundtrip() {
        for t in [
            SourceType::Api,
            SourceType::File,
            SourceType::Web,
            SourceType::Rss,
        ] {
            assert_eq!(SourceType::from_db_string(t.to_db_string()), Some(t));
        }
        assert_eq!(SourceType::from_db_string("gopher"), None);
    }

    #[test]
    fn test_change_type_roundtrip() {
        for t in [ChangeType::Created, ChangeType::Updated, ChangeType::Deleted] {
            assert_eq!(ChangeType::from_db_string(t.to_db_string()), Some(t));
        }
        assert_eq!(ChangeType::from_db_string("renamed"), None);
    }
}
