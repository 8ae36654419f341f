//! Storage abstractions for document and folder rows.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::types::{Document, DocumentFilter, DocumentStatus, Folder, NewDocument, NewFolder};

/// Errors produced by the relational store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No live row matches the identifier.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record looked up.
        entity: &'static str,
        /// Identifier that was requested.
        id: String,
    },
    /// A uniqueness constraint rejected the write.
    #[error("{0} already exists")]
    Conflict(String),
    /// The status update would move the document backwards or out of a terminal state.
    #[error("document {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Document identifier.
        id: i64,
        /// Status currently stored.
        from: DocumentStatus,
        /// Status that was requested.
        to: DocumentStatus,
    },
    /// Stored data could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// Driver-level failure (connection, SQL, I/O).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub(crate) fn document_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "document",
            id: id.to_string(),
        }
    }

    pub(crate) fn folder_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "folder",
            id: id.to_string(),
        }
    }

    /// Whether the error means the row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Persistence for document rows and their status transitions.
///
/// Implementations must be safe to call concurrently from request handlers and workers.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Cheap liveness probe used by health checks.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Insert a new row, stamping creation and upload times.
    async fn create_document(&self, document: NewDocument) -> Result<Document, RepositoryError>;

    /// Fetch a live (not soft-deleted) row.
    async fn get_document(&self, id: i64) -> Result<Document, RepositoryError>;

    /// Advance the status of a row, recording `error` when moving to `failed`.
    ///
    /// Transitions that break the lifecycle are rejected with
    /// [`RepositoryError::InvalidTransition`]. `processed_at` is stamped on `completed`.
    async fn update_status(
        &self,
        id: i64,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// List live rows newest first.
    async fn list_documents(&self, filter: DocumentFilter)
    -> Result<Vec<Document>, RepositoryError>;

    /// Tombstone a row so reads stop returning it.
    async fn mark_deleted(&self, id: i64) -> Result<(), RepositoryError>;

    /// Physically remove a row (tombstoned or not).
    async fn purge_document(&self, id: i64) -> Result<(), RepositoryError>;
}

/// Persistence for folder rows.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Fetch a folder by id.
    async fn get_folder(&self, id: Uuid) -> Result<Folder, RepositoryError>;

    /// Look up a root-level folder by exact name within an organization.
    async fn find_root_folder(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Option<Folder>, RepositoryError>;

    /// Insert a folder; a name clash under the same parent yields [`RepositoryError::Conflict`].
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder, RepositoryError>;
}
