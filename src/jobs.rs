//! In-process registry of indexing jobs
//!
//! At most one job runs per library. A second start for a library that is
//! still running is rejected with `ConcurrentIndexingConflict`; the caller can
//! `subscribe` to the running job's progress instead.

use crate::error::{Error, Result};
use crate::index::{CancellationToken, IndexRequest, IndexingEngine, ProgressCallback};
use crate::models::{IndexOutcome, IndexingStatistics};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Cancelling)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Cancelling => write!(f, "cancelling"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub library_id: String,
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub percent: f32,
    pub statistics: Option<IndexingStatistics>,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    fn started(library_id: &str) -> Self {
        Self {
            library_id: library_id.to_string(),
            status: JobStatus::Running,
            current: 0,
            total: 0,
            percent: 0.0,
            statistics: None,
            error: None,
        }
    }

    fn set_progress(&mut self, current: usize, total: usize) {
        self.current = current;
        self.total = total;
        self.percent = if total == 0 {
            0.0
        } else {
            (current as f32 / total as f32 * 100.0).min(100.0)
        };
    }
}

/// Event sent to progress subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProgressEvent {
    Started {
        library_id: String,
        message: String,
    },
    Progress {
        library_id: String,
        message: String,
        progress: f32,
        current_item: usize,
        total_items: usize,
    },
    Completed {
        library_id: String,
        message: String,
        statistics: IndexingStatistics,
    },
    /// Stopped on request; `statistics` cover the items handled before
    Cancelled {
        library_id: String,
        message: String,
        statistics: IndexingStatistics,
    },
    Error {
        library_id: String,
        message: String,
    },
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Started { .. } => "started",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Completed { .. } => "completed",
            ProgressEvent::Cancelled { .. } => "cancelled",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. }
                | ProgressEvent::Cancelled { .. }
                | ProgressEvent::Error { .. }
        )
    }
}

impl From<&ProgressSnapshot> for ProgressEvent {
    fn from(snap: &ProgressSnapshot) -> Self {
        let library_id = snap.library_id.clone();
        match snap.status {
            JobStatus::Running | JobStatus::Cancelling if snap.total == 0 => {
                ProgressEvent::Started {
                    library_id,
                    message: "Indexing started".to_string(),
                }
            }
            JobStatus::Running | JobStatus::Cancelling => ProgressEvent::Progress {
                message: format!("Processed {} of {} items", snap.current, snap.total),
                library_id,
                progress: snap.percent,
                current_item: snap.current,
                total_items: snap.total,
            },
            JobStatus::Completed => {
                let statistics = snap.statistics.clone().unwrap_or_default();
                ProgressEvent::Completed {
                    library_id,
                    message: format!(
                        "Indexed {} items ({} added, {} updated, {} errors)",
                        statistics.items_processed,
                        statistics.items_added,
                        statistics.items_updated,
                        statistics.errors
                    ),
                    statistics,
                }
            }
            JobStatus::Cancelled => {
                let statistics = snap.statistics.clone().unwrap_or_default();
                ProgressEvent::Cancelled {
                    library_id,
                    message: format!(
                        "Indexing cancelled after {} items",
                        statistics.items_processed
                    ),
                    statistics,
                }
            }
            JobStatus::Failed => ProgressEvent::Error {
                library_id,
                message: snap
                    .error
                    .clone()
                    .unwrap_or_else(|| "Indexing failed".to_string()),
            },
        }
    }
}

/// Caller's handle on a started job
pub struct JobHandle {
    pub library_id: String,
    progress: watch::Receiver<ProgressSnapshot>,
    task: JoinHandle<Result<IndexingStatistics>>,
}

impl JobHandle {
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.clone()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<IndexingStatistics> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("Indexing task failed: {}", e)))?
    }
}

/// Fails a job whose task unwinds before recording an outcome
struct FailOnDrop(Arc<watch::Sender<ProgressSnapshot>>);

impl Drop for FailOnDrop {
    fn drop(&mut self) {
        self.0.send_if_modified(|snap| {
            if !snap.status.is_active() {
                return false;
            }
            snap.status = JobStatus::Failed;
            snap.error = Some("Indexing task aborted".to_string());
            true
        });
    }
}

struct JobEntry {
    cancel: CancellationToken,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
}

impl JobEntry {
    fn is_active(&self) -> bool {
        self.progress.borrow().status.is_active()
    }
}

/// Registry of indexing jobs keyed by library id
#[derive(Clone)]
pub struct JobTracker {
    engine: Arc<IndexingEngine>,
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl JobTracker {
    pub fn new(engine: Arc<IndexingEngine>) -> Self {
        Self {
            engine,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start indexing a library in the background
    pub async fn start(&self, request: IndexRequest) -> Result<JobHandle> {
        let mut jobs = self.jobs.lock().await;

        if jobs
            .get(&request.library_id)
            .is_some_and(JobEntry::is_active)
        {
            debug!(library_id = %request.library_id, "Rejecting concurrent start");
            return Err(Error::ConcurrentIndexingConflict(request.library_id));
        }

        let library_id = request.library_id.clone();
        let (tx, rx) = watch::channel(ProgressSnapshot::started(&library_id));
        let tx = Arc::new(tx);
        let cancel = CancellationToken::new();

        let progress_tx = tx.clone();
        let callback: ProgressCallback = Arc::new(move |current, total| {
            progress_tx.send_modify(|snap| snap.set_progress(current, total));
        });

        let engine = self.engine.clone();
        let token = cancel.clone();
        let final_tx = tx.clone();
        let task = tokio::spawn(async move {
            let _guard = FailOnDrop(final_tx.clone());
            let result = engine.index_library(&request, callback, &token).await;
            final_tx.send_modify(|snap| match &result {
                Ok(stats) => {
                    snap.status = match stats.outcome {
                        IndexOutcome::Completed => JobStatus::Completed,
                        IndexOutcome::Cancelled => JobStatus::Cancelled,
                    };
                    if stats.outcome == IndexOutcome::Completed {
                        snap.set_progress(snap.total, snap.total);
                        snap.percent = 100.0;
                    }
                    snap.statistics = Some(stats.clone());
                }
                Err(e) => {
                    snap.status = JobStatus::Failed;
                    snap.error = Some(e.to_string());
                }
            });
            result
        });

        info!(library_id = %library_id, "Indexing job started");
        jobs.insert(
            library_id.clone(),
            JobEntry {
                cancel,
                progress: tx,
            },
        );

        Ok(JobHandle {
            library_id,
            progress: rx,
            task,
        })
    }

    /// Latest snapshot for a library's current or most recent job
    pub async fn get_progress(&self, library_id: &str) -> Option<ProgressSnapshot> {
        let jobs = self.jobs.lock().await;
        jobs.get(library_id).map(|e| e.progress.borrow().clone())
    }

    /// Follow a library's current or most recent job
    pub async fn subscribe(&self, library_id: &str) -> Option<watch::Receiver<ProgressSnapshot>> {
        let jobs = self.jobs.lock().await;
        jobs.get(library_id).map(|e| e.progress.subscribe())
    }

    /// Request cancellation; false when no job is running for the library
    pub async fn cancel(&self, library_id: &str) -> bool {
        let jobs = self.jobs.lock().await;
        match jobs.get(library_id) {
            Some(entry) if entry.is_active() => {
                entry.cancel.cancel();
                entry.progress.send_modify(|snap| {
                    if snap.status == JobStatus::Running {
                        snap.status = JobStatus::Cancelling;
                    }
                });
                info!(library_id = %library_id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Snapshots of all running jobs
    pub async fn active_jobs(&self) -> Vec<ProgressSnapshot> {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter(|e| e.is_active())
            .map(|e| e.progress.borrow().clone())
            .collect()
    }
}
