//! Bounded worker pool that drives documents from `queued` to `completed` or `failed`.
//!
//! A fixed number of workers share one bounded queue. Every status change is written to the
//! document repository first and mirrored into the in-memory job table afterwards, so the
//! table never runs ahead of the durable row.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::documents::{DocumentRepository, DocumentStatus};
use crate::jobs::processor::DocumentProcessor;
use crate::jobs::types::{DocumentJob, JobError, JobSnapshot, PoolConfig, PoolError};
use crate::metrics::{PoolMetrics, PoolMetricsSnapshot};
use crate::vector::VectorIndex;

/// Shared receiver for multiple workers pulling from one bounded channel.
struct SharedReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> SharedReceiver<T> {
    fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// State shared between the pool handle and its workers.
struct PoolShared {
    documents: Arc<dyn DocumentRepository>,
    processor: Arc<dyn DocumentProcessor>,
    index: Arc<dyn VectorIndex>,
    metrics: Arc<PoolMetrics>,
    jobs: RwLock<HashMap<i64, JobSnapshot>>,
}

/// Handle to a running worker pool.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    sender: RwLock<Option<mpsc::Sender<DocumentJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers on the current runtime.
    pub fn start(
        config: PoolConfig,
        documents: Arc<dyn DocumentRepository>,
        processor: Arc<dyn DocumentProcessor>,
        index: Arc<dyn VectorIndex>,
        metrics: Arc<PoolMetrics>,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = SharedReceiver::new(rx);
        let cancel = CancellationToken::new();
        let shared = Arc::new(PoolShared {
            documents,
            processor,
            index,
            metrics,
            jobs: RwLock::new(HashMap::new()),
        });

        let handles = (0..worker_count)
            .map(|worker| {
                let rx = rx.clone();
                let shared = shared.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { worker_loop(worker, rx, shared, cancel).await })
            })
            .collect();

        tracing::info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Self {
            shared,
            sender: RwLock::new(Some(tx)),
            handles: Mutex::new(handles),
            cancel,
            config,
        }
    }

    /// Enqueue a job, waiting at most the configured submission wait for capacity.
    pub async fn submit(&self, job: DocumentJob) -> Result<(), PoolError> {
        let Some(sender) = self.sender.read().await.clone() else {
            self.shared.metrics.record_rejected();
            return Err(PoolError::ShuttingDown);
        };
        let job_id = job.document_id;

        let previous = {
            let mut jobs = self.shared.jobs.write().await;
            if let Some(existing) = jobs.get(&job_id)
                && !existing.status.is_terminal()
            {
                self.shared.metrics.record_rejected();
                return Err(PoolError::AlreadyActive(job_id));
            }
            jobs.insert(job_id, JobSnapshot::queued(&job))
        };

        let sent = match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) if !self.config.submit_wait.is_zero() => sender
                .send_timeout(job, self.config.submit_wait)
                .await
                .map_err(|err| match err {
                    SendTimeoutError::Timeout(_) => PoolError::QueueFull {
                        capacity: self.config.queue_capacity,
                    },
                    SendTimeoutError::Closed(_) => PoolError::ShuttingDown,
                }),
            Err(TrySendError::Full(_)) => Err(PoolError::QueueFull {
                capacity: self.config.queue_capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(PoolError::ShuttingDown),
        };

        match sent {
            Ok(()) => {
                self.shared.metrics.record_submitted();
                tracing::debug!(job_id, "Job submitted");
                Ok(())
            }
            Err(err) => {
                let mut jobs = self.shared.jobs.write().await;
                match previous {
                    Some(previous) => jobs.insert(job_id, previous),
                    None => jobs.remove(&job_id),
                };
                self.shared.metrics.record_rejected();
                tracing::warn!(job_id, error = %err, "Job submission rejected");
                Err(err)
            }
        }
    }

    /// All jobs known to this process, ordered by id.
    pub async fn jobs(&self) -> Vec<JobSnapshot> {
        let jobs = self.shared.jobs.read().await;
        let mut snapshots: Vec<_> = jobs.values().cloned().collect();
        snapshots.sort_by_key(|job| job.job_id);
        snapshots
    }

    /// In-memory view of one job.
    pub async fn job(&self, job_id: i64) -> Option<JobSnapshot> {
        self.shared.jobs.read().await.get(&job_id).cloned()
    }

    /// Drop terminal jobs that finished more than `max_age` ago. Returns how many were removed.
    pub async fn cleanup_finished(&self, max_age: Duration) -> usize {
        let cutoff = OffsetDateTime::now_utc() - max_age;
        let mut jobs = self.shared.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|done| done < cutoff))
        });
        before - jobs.len()
    }

    /// Pool counters.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stop accepting work, let in-flight jobs finish within the configured grace period,
    /// then abandon the rest.
    ///
    /// Jobs still waiting in the queue are not started; their documents stay `queued`.
    pub async fn shutdown(&self) {
        let grace = self.config.shutdown_grace;
        self.sender.write().await.take();
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let aborters: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        let drained = tokio::time::timeout(grace, join_all(handles)).await.is_ok();
        if !drained {
            for aborter in aborters {
                aborter.abort();
            }
        }

        let (in_flight, queued) = self.unfinished_counts().await;
        if drained {
            tracing::info!(left_queued = queued, "Worker pool stopped");
        } else {
            tracing::warn!(
                abandoned_in_flight = in_flight,
                abandoned_queued = queued,
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace period elapsed; abandoning unfinished jobs"
            );
        }
    }

    /// Jobs caught mid-run and jobs never picked up by a worker.
    async fn unfinished_counts(&self) -> (usize, usize) {
        let jobs = self.shared.jobs.read().await;
        jobs.values().fold((0, 0), |(in_flight, queued), job| match job.status {
            DocumentStatus::Processing | DocumentStatus::Embedding => (in_flight + 1, queued),
            DocumentStatus::Queued => (in_flight, queued + 1),
            _ => (in_flight, queued),
        })
    }
}

async fn worker_loop(
    worker: usize,
    rx: SharedReceiver<DocumentJob>,
    shared: Arc<PoolShared>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "Worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        shared.run_job(worker, job).await;
    }
    tracing::debug!(worker, "Worker stopped");
}

/// Why a job stopped before reaching a terminal state of its own.
enum Halt {
    Failed(JobError),
    Removed,
}

impl From<JobError> for Halt {
    fn from(err: JobError) -> Self {
        Self::Failed(err)
    }
}

impl PoolShared {
    async fn run_job(&self, worker: usize, job: DocumentJob) {
        let job_id = job.document_id;
        tracing::info!(worker, job_id, "Job started");

        let outcome = AssertUnwindSafe(self.execute(&job)).catch_unwind().await;
        let halt = match outcome {
            Ok(Ok(())) => {
                self.metrics.record_completed();
                tracing::info!(worker, job_id, "Job completed");
                return;
            }
            Ok(Err(halt)) => halt,
            Err(panic) => Halt::Failed(JobError::Panicked(panic_message(panic))),
        };

        match halt {
            Halt::Failed(err) => {
                let message = err.to_string();
                tracing::error!(worker, job_id, error = %message, "Job failed");
                if let Err(store_err) = self
                    .documents
                    .update_status(job_id, DocumentStatus::Failed, Some(&message))
                    .await
                {
                    tracing::error!(job_id, error = %store_err, "Failed to persist job failure");
                }
                self.mirror(job_id, DocumentStatus::Failed, Some(&message)).await;
            }
            Halt::Removed => {
                tracing::warn!(worker, job_id, "Document removed while processing; job dropped");
                self.mirror(
                    job_id,
                    DocumentStatus::Failed,
                    Some("document removed during processing"),
                )
                .await;
            }
        }
        self.metrics.record_failed();
    }

    async fn execute(&self, job: &DocumentJob) -> Result<(), Halt> {
        let job_id = job.document_id;
        self.transition(job_id, DocumentStatus::Processing).await?;

        let chunks = self.processor.process(job).await.map_err(JobError::from)?;
        tracing::debug!(job_id, chunks = chunks.len(), "Processor finished");

        self.transition(job_id, DocumentStatus::Embedding).await?;
        self.index
            .index_document_chunks(job_id, &chunks)
            .await
            .map_err(JobError::from)?;

        self.transition(job_id, DocumentStatus::Completed).await
    }

    async fn transition(&self, job_id: i64, status: DocumentStatus) -> Result<(), Halt> {
        match self.documents.update_status(job_id, status, None).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Err(Halt::Removed),
            Err(err) => return Err(Halt::Failed(err.into())),
        }
        self.mirror(job_id, status, None).await;
        tracing::debug!(job_id, %status, "Job stage changed");
        Ok(())
    }

    async fn mirror(&self, job_id: i64, status: DocumentStatus, error: Option<&str>) {
        if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
            job.advance(status, error);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
