//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Tidewatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered data sources and their download lifecycle
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    domain TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    downloaded_records INTEGER NOT NULL DEFAULT 0,
    total_records INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    last_successful_download TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sources_status ON sources(status);
CREATE INDEX IF NOT EXISTS idx_sources_domain ON sources(domain);

-- Raw records, keyed by natural key within a source
CREATE TABLE IF NOT EXISTS records (
    source_id INTEGER NOT NULL REFERENCES sources(id),
    record_key TEXT NOT NULL,
    data TEXT NOT NULL,
    downloaded_at TEXT NOT NULL,
    PRIMARY KEY (source_id, record_key)
);

CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_id);

-- Append-only fingerprint log
CREATE TABLE IF NOT EXISTS fingerprints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    record_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    verification_status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fingerprints_source ON fingerprints(source_id);

-- Append-only change-event log
CREATE TABLE IF NOT EXISTS change_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    source_url TEXT NOT NULL,
    change_type TEXT NOT NULL,
    old_data TEXT,
    new_data TEXT,
    old_content_hash TEXT,
    new_content_hash TEXT,
    field_diff TEXT,
    detected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_changes_source ON change_events(source_id);
CREATE INDEX IF NOT EXISTS idx_changes_detected ON change_events(detected_at);

-- Dataset-version bookkeeping
CREATE TABLE IF NOT EXISTS dataset_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    parent_version INTEGER REFERENCES dataset_versions(id),
    sample_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
