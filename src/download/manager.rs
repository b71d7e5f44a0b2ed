//! Resumable download manager
//!
//! Owns the source status machine. A download always resumes from the
//! persisted checkpoint (the count of durably stored records), so a crash
//! or restart costs at most one batch of work.

use crate::adapter::{make_adapter, SourceAdapter};
use crate::config::DownloadConfig;
use crate::download::retry::{classify_failure, BackoffPolicy, FailureKind};
use crate::limiter::RateLimiter;
use crate::record::{canonical_hash, Record};
use crate::state::SourceStatus;
use crate::storage::{FingerprintRecord, SourceType, SqliteStorage, Storage};
use crate::{Result, TideError};
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

/// Outcome of a bulk download run
#[derive(Debug, Default, Clone)]
pub struct DownloadSummary {
    pub succeeded: u64,
    pub failed: u64,
}

/// Coordinates resumable downloads across all registered sources
pub struct DownloadManager {
    storage: Arc<Mutex<SqliteStorage>>,
    client: Client,
    limiter: Arc<RateLimiter>,
    config: DownloadConfig,
    workers: usize,
    stop: Option<watch::Receiver<bool>>,
}

impl DownloadManager {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        client: Client,
        limiter: Arc<RateLimiter>,
        config: DownloadConfig,
        workers: usize,
    ) -> Self {
        Self {
            storage,
            client,
            limiter,
            config,
            workers: workers.max(1),
            stop: None,
        }
    }

    /// Installs a cooperative stop signal checked between batches and sources
    ///
    /// A run stopped mid-download leaves the source `partial` with its
    /// checkpoint intact, exactly as any other interrupted run would.
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Registers a source, deriving the domain from the URL when absent
    pub fn register_source(
        &self,
        url: &str,
        source_type: SourceType,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let derived;
        let domain = match domain {
            Some(domain) => domain,
            None => {
                let parsed = Url::parse(url)?;
                derived = crate::url::extract_domain(&parsed).unwrap_or_default();
                &derived
            }
        };

        let mut storage = self.storage.lock().unwrap();
        let source_id = storage.create_source(url, source_type, domain, metadata)?;
        info!(source_id, url, %source_type, "Source registered");
        Ok(source_id)
    }

    /// Resumes (or starts) the download for one source
    ///
    /// Returns the total number of records persisted for the source. On
    /// failure the source is marked `failed`, or `partial` when this run
    /// made progress first, and the error is propagated.
    pub async fn resume_download(&self, source_id: i64) -> Result<u64> {
        let source = {
            let storage = self.storage.lock().unwrap();
            storage.get_source(source_id)?
        };

        info!(source_id, url = %source.url, checkpoint = source.downloaded_records,
              "Resuming download");

        let adapter = make_adapter(&source, &self.client)?;

        {
            let mut storage = self.storage.lock().unwrap();
            storage.update_source_status(source_id, SourceStatus::Downloading, None)?;
        }

        let checkpoint = source.downloaded_records;
        match self
            .download_from(source_id, adapter.as_ref(), checkpoint)
            .await
        {
            Ok(total) => {
                let mut storage = self.storage.lock().unwrap();
                storage.update_source_status(source_id, SourceStatus::Completed, None)?;
                info!(source_id, total, "Download completed");
                Ok(total)
            }
            Err(e) => {
                let progressed = {
                    let storage = self.storage.lock().unwrap();
                    storage
                        .get_source(source_id)
                        .map(|s| s.downloaded_records > checkpoint)
                        .unwrap_or(false)
                };
                let status = if progressed {
                    SourceStatus::Partial
                } else {
                    SourceStatus::Failed
                };
                error!(source_id, error = %e, ?status, "Download failed");
                let mut storage = self.storage.lock().unwrap();
                storage.update_source_status(source_id, status, Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn download_from(
        &self,
        source_id: i64,
        adapter: &dyn SourceAdapter,
        mut offset: u64,
    ) -> Result<u64> {
        if let Some(total) = adapter.estimate_total().await? {
            debug!(source_id, total, "Refreshed total estimate");
            let mut storage = self.storage.lock().unwrap();
            storage.set_total_estimate(source_id, total)?;
        }

        let batch_size = self.config.batch_size as u64;
        let policy = BackoffPolicy::new(&self.config.retry, self.config.rate_limit_cooldown_secs);

        loop {
            if self.stop_requested() {
                return Err(TideError::Download {
                    source_id,
                    message: "Interrupted by stop signal".to_string(),
                });
            }
            let batch = self
                .fetch_batch(source_id, adapter, offset, batch_size, &policy)
                .await?;
            if batch.is_empty() {
                break;
            }

            let short = (batch.len() as u64) < batch_size;
            offset += batch.len() as u64;

            {
                let mut storage = self.storage.lock().unwrap();
                storage.put_records(source_id, &batch)?;
                storage.append_fingerprints(&fingerprints_for(source_id, &batch))?;
                storage.update_progress(source_id, offset)?;
            }
            info!(source_id, downloaded = offset, "Checkpoint persisted");

            if short {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.pacing_delay_ms)).await;
        }

        Ok(offset)
    }

    /// One batch fetch under the rate limiter and the retry policy
    async fn fetch_batch(
        &self,
        source_id: i64,
        adapter: &dyn SourceAdapter,
        offset: u64,
        limit: u64,
        policy: &BackoffPolicy,
    ) -> Result<Vec<Record>> {
        let mut attempt = 0u32;

        loop {
            loop {
                let wait = self.limiter.admit();
                if wait.is_zero() {
                    self.limiter.record();
                    break;
                }
                debug!(source_id, wait_ms = wait.as_millis() as u64, "Rate limit wait");
                tokio::time::sleep(wait).await;
            }

            match adapter.download_incremental(offset, limit).await {
                Ok(batch) => return Ok(batch),
                Err(e) => {
                    attempt += 1;
                    let kind = classify_failure(&e);
                    if kind == FailureKind::Fatal || attempt >= policy.max_attempts {
                        return Err(e);
                    }
                    let delay = match kind {
                        FailureKind::RateLimited => policy.rate_limit_cooldown(),
                        _ => policy.delay_for(attempt - 1),
                    };
                    warn!(source_id, offset, attempt, delay_ms = delay.as_millis() as u64,
                          error = %e, "Batch fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Downloads every source currently waiting for work
    ///
    /// Sources in `pending` or `partial` are distributed over the worker
    /// pool; `failed` sources are retried only through an explicit
    /// `resume_download`.
    pub async fn download_all_pending(self: &Arc<Self>) -> Result<DownloadSummary> {
        let eligible: Vec<i64> = {
            let storage = self.storage.lock().unwrap();
            storage
                .get_active_sources()?
                .into_iter()
                .filter(|s| {
                    matches!(s.status, SourceStatus::Pending | SourceStatus::Partial)
                })
                .map(|s| s.id)
                .collect()
        };

        if eligible.is_empty() {
            info!("No sources waiting for download");
            return Ok(DownloadSummary::default());
        }
        info!(count = eligible.len(), workers = self.workers, "Starting bulk download");

        let queue = Arc::new(Mutex::new(VecDeque::from(eligible)));
        let mut handles = Vec::with_capacity(self.workers);

        for _ in 0..self.workers {
            let manager = Arc::clone(self);
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut summary = DownloadSummary::default();
                loop {
                    if manager.stop_requested() {
                        break;
                    }
                    let next = queue.lock().unwrap().pop_front();
                    let Some(source_id) = next else {
                        break;
                    };
                    match manager.resume_download(source_id).await {
                        Ok(_) => summary.succeeded += 1,
                        Err(e) => {
                            warn!(source_id, error = %e, "Source download failed");
                            summary.failed += 1;
                        }
                    }
                }
                summary
            }));
        }

        let mut total = DownloadSummary::default();
        for handle in handles {
            match handle.await {
                Ok(summary) => {
                    total.succeeded += summary.succeeded;
                    total.failed += summary.failed;
                }
                Err(e) => warn!(error = %e, "Download worker panicked"),
            }
        }

        info!(succeeded = total.succeeded, failed = total.failed, "Bulk download finished");
        Ok(total)
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }
}

/// Fingerprint log entries for a freshly persisted batch
fn fingerprints_for(source_id: i64, batch: &[Record]) -> Vec<FingerprintRecord> {
    batch
        .iter()
        .map(|record| FingerprintRecord {
            source_id,
            record_id: record.key_or_hash(),
            content_hash: canonical_hash(record),
            verification_status: "pending".to_string(),
        })
        .collect()
}

// Download flows against live HTTP are exercised in the integration tests
// with wiremock; the unit tests here cover the pure pieces.
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprints_carry_natural_keys() {
        let batch = vec![
            Record::from_value(json!({"id": "a", "title": "x"})),
            Record::from_value(json!({"title": "no identity"})),
        ];
        let fingerprints = fingerprints_for(7, &batch);

        assert_eq!(fingerprints.len(), 2);
        assert_eq!(fingerprints[0].record_id, "a");
        assert_eq!(fingerprints[0].verification_status, "pending");
        // Keyless records are identified by their content hash
        assert_eq!(fingerprints[1].record_id, canonical_hash(&batch[1]));
    }
}
