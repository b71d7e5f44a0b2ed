//! Integrity verification
//!
//! Checks that what storage holds still matches the origin: every original
//! record present, hashing identically, with nothing unexplained on our
//! side. A verification run without reference originals is reported as
//! incomplete rather than passed.

use crate::adapter::make_adapter;
use crate::detect::diff::describe_differences;
use crate::record::{canonical_hash, Record};
use crate::state::SourceStatus;
use crate::storage::{SqliteStorage, Storage};
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Score below which a source is demoted to `failed`
const DEMOTION_THRESHOLD: f64 = 0.95;

/// Score below which a verification summary is flagged as a warning
const WARNING_THRESHOLD: f64 = 0.99;

/// Whether reference originals backed a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    /// Originals were fetched or supplied; the score is meaningful
    Complete,
    /// No originals were available; the verification is incomplete
    Missing,
}

/// One stored record whose content no longer matches its original
#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub id: String,
    pub original_hash: String,
    pub stored_hash: String,
    pub differences: Vec<String>,
}

/// Result of verifying one source
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub source_id: i64,
    pub source_url: String,
    pub total_original: u64,
    pub total_stored: u64,
    /// Original record ids absent from storage
    pub missing: Vec<String>,
    pub mismatched: Vec<Mismatch>,
    /// Stored record ids with no original counterpart
    pub extra: Vec<String>,
    pub integrity_score: f64,
    pub reference: Reference,
    pub verified_at: String,
}

impl IntegrityReport {
    /// True when the score can be trusted as a full verification
    pub fn is_complete(&self) -> bool {
        self.reference == Reference::Complete
    }
}

/// Compact per-source outcome of a verification sweep
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub source_id: i64,
    pub source_url: String,
    pub integrity_score: f64,
    pub status: String,
    pub missing_count: usize,
    pub mismatched_count: usize,
    pub extra_count: usize,
}

/// Verifies stored data against origin snapshots
pub struct IntegrityChecker {
    storage: Arc<Mutex<SqliteStorage>>,
    client: Client,
}

impl IntegrityChecker {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, client: Client) -> Self {
        Self { storage, client }
    }

    /// Verifies one source against the supplied originals
    ///
    /// With `originals: None` the report is marked incomplete; the stored
    /// side alone cannot prove anything was lost.
    pub fn verify_downloaded_data(
        &self,
        source_id: i64,
        originals: Option<&[Record]>,
    ) -> Result<IntegrityReport> {
        let (source, stored) = {
            let storage = self.storage.lock().unwrap();
            (storage.get_source(source_id)?, storage.get_records(source_id)?)
        };

        let reference = match originals {
            Some(_) => Reference::Complete,
            None => {
                warn!(source_id, "No reference originals, verification incomplete");
                Reference::Missing
            }
        };
        let originals = originals.unwrap_or(&[]);

        let original_by_key: HashMap<String, &Record> =
            originals.iter().map(|r| (r.key_or_hash(), r)).collect();
        let stored_by_key: HashMap<String, &Record> =
            stored.iter().map(|r| (r.key_or_hash(), r)).collect();

        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        for (key, original) in &original_by_key {
            match stored_by_key.get(key) {
                None => missing.push(key.clone()),
                Some(stored_record) => {
                    let original_hash = canonical_hash(original);
                    let stored_hash = canonical_hash(stored_record);
                    if original_hash != stored_hash {
                        mismatched.push(Mismatch {
                            id: key.clone(),
                            original_hash,
                            stored_hash,
                            differences: describe_differences(original, stored_record),
                        });
                    }
                }
            }
        }

        let extra: Vec<String> = stored_by_key
            .keys()
            .filter(|key| !original_by_key.contains_key(*key))
            .cloned()
            .collect();

        let total_original = original_by_key.len() as u64;
        let total_stored = stored_by_key.len() as u64;
        let integrity_score = if total_original > 0 {
            let matched = total_original as f64 - missing.len() as f64 - mismatched.len() as f64;
            matched / total_original as f64
        } else if total_stored > 0 {
            // Nothing to compare against; the stored copy stands unchallenged
            1.0
        } else {
            0.0
        };

        Ok(IntegrityReport {
            source_id,
            source_url: source.url,
            total_original,
            total_stored,
            missing,
            mismatched,
            extra,
            integrity_score,
            reference,
            verified_at: Utc::now().to_rfc3339(),
        })
    }

    /// Fetches fresh originals through the adapter and verifies against them
    pub async fn verify_source(&self, source_id: i64) -> Result<IntegrityReport> {
        let source = {
            let storage = self.storage.lock().unwrap();
            storage.get_source(source_id)?
        };
        let adapter = make_adapter(&source, &self.client)?;
        let originals = adapter.fetch_original_data().await?;
        self.verify_downloaded_data(source_id, Some(&originals))
    }

    /// Verifies every downloaded source, demoting those below the threshold
    ///
    /// Sources that have not finished a download yet are skipped; there is
    /// nothing meaningful to verify.
    pub async fn verify_all_sources(&self) -> Result<Vec<VerificationSummary>> {
        let sources: Vec<_> = {
            let storage = self.storage.lock().unwrap();
            storage
                .get_active_sources()?
                .into_iter()
                .filter(|s| matches!(s.status, SourceStatus::Completed | SourceStatus::Partial))
                .collect()
        };
        info!(count = sources.len(), "Starting verification sweep");

        let mut summaries = Vec::new();
        for source in sources {
            let report = match self.verify_source(source.id).await {
                Ok(report) => report,
                Err(e) => {
                    error!(source_id = source.id, error = %e, "Verification failed");
                    summaries.push(VerificationSummary {
                        source_id: source.id,
                        source_url: source.url.clone(),
                        integrity_score: 0.0,
                        status: "error".to_string(),
                        missing_count: 0,
                        mismatched_count: 0,
                        extra_count: 0,
                    });
                    continue;
                }
            };

            let status = if report.integrity_score >= WARNING_THRESHOLD {
                "ok"
            } else {
                "warning"
            };
            summaries.push(VerificationSummary {
                source_id: source.id,
                source_url: source.url.clone(),
                integrity_score: report.integrity_score,
                status: status.to_string(),
                missing_count: report.missing.len(),
                mismatched_count: report.mismatched.len(),
                extra_count: report.extra.len(),
            });

            if report.integrity_score < DEMOTION_THRESHOLD {
                warn!(source_id = source.id, score = report.integrity_score,
                      "Integrity below threshold, demoting source");
                let message = format!(
                    "Low integrity score: {:.1}%",
                    report.integrity_score * 100.0
                );
                let mut storage = self.storage.lock().unwrap();
                storage.update_source_status(source.id, SourceStatus::Failed, Some(&message))?;
            }
        }

        info!(checked = summaries.len(), "Verification sweep finished");
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SourceType;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value)
    }

    fn checker_with_source(stored: &[Record]) -> (IntegrityChecker, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage
            .create_source(
                "https://api.example.gov.ua/registry",
                SourceType::Api,
                "api.example.gov.ua",
                None,
            )
            .unwrap();
        storage.put_records(id, stored).unwrap();
        let checker = IntegrityChecker::new(
            Arc::new(Mutex::new(storage)),
            Client::new(),
        );
        (checker, id)
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| record(json!({"id": format!("r{}", i), "title": format!("row {}", i)})))
            .collect()
    }

    #[test]
    fn test_perfect_match_scores_one() {
        let data = rows(100);
        let (checker, id) = checker_with_source(&data);

        let report = checker.verify_downloaded_data(id, Some(&data)).unwrap();
        assert_eq!(report.integrity_score, 1.0);
        assert!(report.is_complete());
        assert!(report.missing.is_empty());
        assert!(report.mismatched.is_empty());
        assert!(report.extra.is_empty());
    }

    #[test]
    fn test_missing_and_mismatched_lower_score() {
        // Store 95 of 100 originals, then corrupt 3 of them
        let originals = rows(100);
        let mut stored = originals[..95].to_vec();
        for record in stored.iter_mut().take(3) {
            record.fields.insert("title".to_string(), json!("corrupted"));
        }
        let (checker, id) = checker_with_source(&stored);

        let report = checker.verify_downloaded_data(id, Some(&originals)).unwrap();
        assert_eq!(report.missing.len(), 5);
        assert_eq!(report.mismatched.len(), 3);
        // (100 - 5 - 3) / 100
        assert!((report.integrity_score - 0.92).abs() < 1e-9);
        assert!(!report.mismatched[0].differences.is_empty());
    }

    #[test]
    fn test_extra_records_reported_but_not_scored() {
        let originals = rows(10);
        let mut stored = originals.clone();
        stored.push(record(json!({"id": "stray", "title": "not in origin"})));
        let (checker, id) = checker_with_source(&stored);

        let report = checker.verify_downloaded_data(id, Some(&originals)).unwrap();
        assert_eq!(report.extra, vec!["stray".to_string()]);
        assert_eq!(report.integrity_score, 1.0);
    }

    #[test]
    fn test_no_originals_is_incomplete() {
        let (checker, id) = checker_with_source(&rows(10));

        let report = checker.verify_downloaded_data(id, None).unwrap();
        assert_eq!(report.reference, Reference::Missing);
        assert!(!report.is_complete());
        assert_eq!(report.integrity_score, 1.0);
    }

    #[test]
    fn test_empty_both_sides_scores_zero() {
        let (checker, id) = checker_with_source(&[]);

        let report = checker.verify_downloaded_data(id, Some(&[])).unwrap();
        assert_eq!(report.integrity_score, 0.0);
        assert!(report.is_complete());
    }
}
