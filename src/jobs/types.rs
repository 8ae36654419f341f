//! Job descriptors, in-memory job records, and pool errors.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;
use crate::documents::{DocumentStatus, Metadata, RepositoryError};
use crate::jobs::processor::ProcessorError;
use crate::vector::VectorError;

/// Unit of work handed to the pool. The job id is the document id.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentJob {
    /// Document (and job) identifier.
    pub document_id: i64,
    /// Absolute path of the uploaded file.
    pub source_path: PathBuf,
    /// Absolute path the processor writes its chunk artifact to.
    pub artifact_path: PathBuf,
    /// Folder the document lives in.
    pub folder_id: Option<Uuid>,
    /// Metadata captured at submission.
    pub metadata: Metadata,
}

/// Introspection view of an in-memory job entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    /// Job identifier (equals the document id).
    pub job_id: i64,
    /// Absolute source path.
    pub source_path: String,
    /// Absolute artifact path.
    pub artifact_path: String,
    /// Folder the document lives in.
    pub folder_id: Option<Uuid>,
    /// Metadata captured at submission.
    pub metadata: Metadata,
    /// Last status the worker reached.
    pub status: DocumentStatus,
    /// When the job entered the queue.
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    /// When a worker picked the job up.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// When the job reached a terminal state.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Last error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    pub(crate) fn queued(job: &DocumentJob) -> Self {
        Self {
            job_id: job.document_id,
            source_path: job.source_path.display().to_string(),
            artifact_path: job.artifact_path.display().to_string(),
            folder_id: job.folder_id,
            metadata: job.metadata.clone(),
            status: DocumentStatus::Queued,
            submitted_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub(crate) fn advance(&mut self, status: DocumentStatus, error: Option<&str>) {
        let now = OffsetDateTime::now_utc();
        self.status = status;
        if status == DocumentStatus::Processing {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        if let Some(error) = error {
            self.error = Some(error.to_string());
        }
    }
}

/// Static sizing of the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Concurrent workers.
    pub worker_count: usize,
    /// Bounded queue capacity.
    pub queue_capacity: usize,
    /// How long `submit` may wait for capacity before reporting a full queue.
    pub submit_wait: Duration,
    /// Grace period for in-flight jobs at shutdown.
    pub shutdown_grace: Duration,
}

impl PoolConfig {
    /// Derive pool sizing from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            queue_capacity: config.job_queue_size,
            submit_wait: config.job_submit_wait,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            queue_capacity: 100,
            submit_wait: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Reasons a submission is turned away.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The queue stayed full for the whole submission wait.
    #[error("job queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// The pool no longer accepts work.
    #[error("worker pool is shutting down")]
    ShuttingDown,
    /// A job for the same document is still queued or running.
    #[error("job {0} is already active")]
    AlreadyActive(i64),
}

/// Failures that end a job in `failed`.
#[derive(Debug, Error)]
pub enum JobError {
    /// The external processor failed.
    #[error("processing failed: {0}")]
    Processor(#[from] ProcessorError),
    /// Writing chunks to the index failed.
    #[error("indexing failed: {0}")]
    Index(#[from] VectorError),
    /// The status could not be persisted.
    #[error("status update failed: {0}")]
    Repository(#[from] RepositoryError),
    /// The job panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
}
