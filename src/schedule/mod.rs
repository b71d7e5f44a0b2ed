//! Periodic task runner
//!
//! Runs named maintenance tasks (change detection, integrity verification,
//! dataset versioning) on fixed intervals over a short polling tick. Tasks
//! within one tick run sequentially, so one slow task delays the others
//! until it finishes; acceptable for hour-scale intervals.

use crate::storage::{ChangeType, SqliteStorage, Storage};
use crate::{Result, TideError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Execution state of a periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

type TaskAction =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// A named task with an interval and run history
pub struct PeriodicTask {
    pub name: String,
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub success_count: u64,
    pub error_count: u64,
    pub enabled: bool,
    action: TaskAction,
}

impl PeriodicTask {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                elapsed >= self.interval
            }
        }
    }
}

/// Snapshot of a task's state, for status reporting
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub name: String,
    pub status: TaskStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub error_count: u64,
    pub enabled: bool,
}

/// Drives registered tasks on their intervals
pub struct TaskRunner {
    tasks: HashMap<String, PeriodicTask>,
    tick: Duration,
}

impl TaskRunner {
    pub fn new(tick: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            tick,
        }
    }

    /// Registers a task; it becomes due immediately
    pub fn register<F, Fut>(&mut self, name: &str, interval: Duration, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let task = PeriodicTask {
            name: name.to_string(),
            interval,
            last_run: None,
            status: TaskStatus::Pending,
            success_count: 0,
            error_count: 0,
            enabled: true,
            action: Arc::new(move || Box::pin(action())),
        };
        info!(task = name, interval_secs = interval.as_secs(), "Task registered");
        self.tasks.insert(name.to_string(), task);
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tasks.get_mut(name) {
            Some(task) => {
                task.enabled = enabled;
                info!(task = name, enabled, "Task toggled");
                true
            }
            None => false,
        }
    }

    /// Runs one task immediately, ignoring its interval and enabled flag
    pub async fn run_now(&mut self, name: &str) -> Result<()> {
        if !self.tasks.contains_key(name) {
            return Err(TideError::Download {
                source_id: 0,
                message: format!("Unknown task: {}", name),
            });
        }
        self.execute(name).await
    }

    /// Runs every enabled task whose interval has elapsed
    ///
    /// Disabled tasks that would have been due are marked skipped.
    pub async fn run_due(&mut self) {
        let now = Utc::now();
        let mut due: Vec<String> = self
            .tasks
            .values()
            .filter(|task| task.is_due(now))
            .map(|task| task.name.clone())
            .collect();
        due.sort();

        for name in due {
            let enabled = self.tasks[&name].enabled;
            if !enabled {
                if let Some(task) = self.tasks.get_mut(&name) {
                    task.status = TaskStatus::Skipped;
                }
                continue;
            }
            // Failures are recorded on the task; the loop keeps going
            let _ = self.execute(&name).await;
        }
    }

    async fn execute(&mut self, name: &str) -> Result<()> {
        let action = {
            let task = self.tasks.get_mut(name).expect("task exists");
            task.status = TaskStatus::Running;
            Arc::clone(&task.action)
        };

        info!(task = name, "Task starting");
        let outcome = action().await;

        // last_run advances even on failure so a broken task cannot spin
        let task = self.tasks.get_mut(name).expect("task exists");
        task.last_run = Some(Utc::now());
        match &outcome {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.success_count += 1;
                info!(task = name, "Task completed");
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.error_count += 1;
                error!(task = name, error = %e, "Task failed");
            }
        }
        outcome
    }

    /// Polls tasks until the stop signal flips
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs(), tasks = self.tasks.len(), "Task runner started");
        loop {
            self.run_due().await;

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        info!("Task runner stopping");
                        return;
                    }
                }
            }
        }
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<TaskSnapshot> = self
            .tasks
            .values()
            .map(|task| TaskSnapshot {
                name: task.name.clone(),
                status: task.status,
                last_run: task.last_run,
                success_count: task.success_count,
                error_count: task.error_count,
                enabled: task.enabled,
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

/// Cuts a new incremental dataset version when enough changes accumulated
///
/// Counts created/updated events since the latest version (all events when
/// no version exists yet) and records a new version once the count reaches
/// `min_new_samples`. Returns the new version id, if one was cut.
pub fn run_incremental_dataset_task(
    storage: &Arc<Mutex<SqliteStorage>>,
    min_new_samples: u64,
) -> Result<Option<i64>> {
    let mut storage = storage.lock().unwrap();

    let latest = storage.latest_dataset_version()?;
    let since = match &latest {
        Some(version) => DateTime::parse_from_rfc3339(&version.created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now() - chrono::Duration::days(365)),
        None => Utc::now() - chrono::Duration::days(365),
    };

    let new_samples = storage
        .get_changes_since(None, since)?
        .iter()
        .filter(|e| matches!(e.change_type, ChangeType::Created | ChangeType::Updated))
        .count() as u64;

    if new_samples < min_new_samples {
        info!(new_samples, min_new_samples, "Not enough new samples for a dataset version");
        return Ok(None);
    }

    let name = format!("incremental-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let parent = latest.map(|version| version.id);
    let version_id = storage.create_dataset_version(&name, parent, new_samples)?;
    info!(version_id, %name, new_samples, "Dataset version recorded");
    Ok(Some(version_id))
}
