//! Asynchronous document processing: job queue, worker pool, and the external processor.

pub mod pool;
pub mod processor;
pub mod types;

pub use pool::WorkerPool;
pub use processor::{CommandProcessor, DocumentProcessor, ProcessorError, read_artifact};
pub use types::{DocumentJob, JobError, JobSnapshot, PoolConfig, PoolError};
