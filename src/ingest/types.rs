//! Request, response, and error types for the ingestion orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::documents::{DocumentStatus, Metadata, RepositoryError};
use crate::jobs::PoolError;
use crate::search::SearchError;

/// Upload notification for a file already written to the resources storage root.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Owning organization; omitted for globally visible documents.
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    /// Uploading user.
    pub user_id: Uuid,
    /// Path of the stored file relative to the resources root.
    pub file_path: String,
    /// Target folder as a string id; blank or missing means the default landing folder.
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Free-form metadata copied onto the document and its job.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// New document identifier.
    pub document_id: i64,
    /// Display name derived from the file path.
    pub filename: String,
    /// Status the document was created with.
    pub status: DocumentStatus,
    /// Job identifier, `null` when no job entered the queue.
    pub job_id: Option<i64>,
    /// Milliseconds spent handling the upload.
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,
}

/// Listing parameters. Page and limit are expected to be sanitized by the caller.
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// Restrict to one organization.
    pub organization_id: Option<Uuid>,
    /// Folder filter as a string id.
    pub folder_id: Option<String>,
    /// 1-indexed page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

/// Folder creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRequest {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Creating user.
    pub user_id: Uuid,
    /// Folder name (a single path segment).
    pub name: String,
    /// Parent folder as a string id; missing means a root folder.
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Errors surfaced by the ingestion orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The job id is not a valid document identifier.
    #[error("invalid job id: {0}")]
    InvalidJobId(String),
    /// The folder id is not a valid identifier.
    #[error("invalid folder id: {0}")]
    InvalidFolderId(String),
    /// The upload path is empty, absolute, or escapes the storage root.
    #[error("invalid file path: {0}")]
    InvalidPath(String),
    /// A folder name is empty or contains a separator.
    #[error("invalid folder name: {0:?}")]
    InvalidFolderName(String),
    /// The referenced folder does not exist in the caller's organization.
    #[error("folder {0} not found")]
    FolderNotFound(Uuid),
    /// The document exists but is not in a state that allows the operation.
    #[error("{0}")]
    InvalidOperation(String),
    /// The document or job does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A folder with the same name already exists under the parent.
    #[error("{0}")]
    Conflict(String),
    /// The worker pool refused the job.
    #[error("job queue unavailable: {0}")]
    Queue(#[from] PoolError),
    /// Relational store failure.
    #[error(transparent)]
    Repository(RepositoryError),
    /// Search validation or index failure.
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl IngestError {
    /// Whether the caller supplied bad input.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::InvalidJobId(_)
            | Self::InvalidFolderId(_)
            | Self::InvalidPath(_)
            | Self::InvalidFolderName(_)
            | Self::InvalidOperation(_) => true,
            Self::Search(err) => err.is_validation(),
            _ => false,
        }
    }

    /// Whether the target record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::FolderNotFound(_))
    }
}

impl From<RepositoryError> for IngestError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            RepositoryError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            other => Self::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_not_found_maps_to_not_found() {
        let err = IngestError::from(RepositoryError::document_not_found(7));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "document 7 not found");
    }

    #[test]
    fn search_validation_is_propagated() {
        let err = IngestError::from(SearchError::EmptyQuery);
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn upload_request_accepts_camel_case_and_defaults() {
        let request: UploadRequest = serde_json::from_value(serde_json::json!({
            "userId": "6f1c1c52-8d59-4d0e-9a53-0b8f0b1b7e10",
            "filePath": "org/report.pdf"
        }))
        .expect("request");
        assert!(request.organization_id.is_none());
        assert!(request.folder_id.is_none());
        assert!(request.metadata.is_empty());
        assert_eq!(request.file_path, "org/report.pdf");
    }
}
