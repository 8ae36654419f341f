//! Ingestion orchestrator: uploads, status lookups, listings, deletes, and folder management.

pub mod paths;
mod service;
pub mod types;

pub use paths::StorageLayout;
pub use service::{IngestApi, IngestionService, parse_job_id, parse_optional_folder_id};
pub use types::{FolderRequest, IngestError, ListRequest, UploadOutcome, UploadRequest};
