//! Document and folder records plus the shared status lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Free-form key/value metadata attached to a document.
pub type Metadata = Map<String, Value>;

/// Processing state shared by persisted documents and in-memory jobs.
///
/// The lifecycle is `queued -> processing -> embedding -> completed`; `failed` can be reached
/// from any of the first three states. Nothing ever moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Waiting for a worker (initial state of pipeline documents).
    Queued,
    /// A worker is running the external processor.
    Processing,
    /// Chunks are being written to the vector index.
    Embedding,
    /// Terminal success.
    Completed,
    /// Terminal failure; see the recorded error message.
    Failed,
}

impl DocumentStatus {
    /// Stable lowercase label used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Embedding)
                | (Self::Embedding, Self::Completed)
                | (Self::Queued | Self::Processing | Self::Embedding, Self::Failed)
        )
    }

    /// States from which `self` may be entered.
    pub fn predecessors(self) -> &'static [DocumentStatus] {
        match self {
            Self::Queued => &[],
            Self::Processing => &[Self::Queued],
            Self::Embedding => &[Self::Processing],
            Self::Completed => &[Self::Embedding],
            Self::Failed => &[Self::Queued, Self::Processing, Self::Embedding],
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status label is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "embedding" => Ok(Self::Embedding),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Persisted document row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Monotonic identifier; doubles as the job id and vector collection id.
    pub id: i64,
    /// Owning organization; `None` marks a globally visible document.
    pub organization_id: Option<Uuid>,
    /// Containing folder, `None` for root-level documents.
    pub folder_id: Option<Uuid>,
    /// Display name (file name of the upload).
    pub name: String,
    /// Upload path relative to the storage root.
    pub file_path: String,
    /// Chunk artifact path relative to the artifact root.
    pub artifact_path: String,
    /// Free-form metadata supplied at upload.
    pub metadata: Metadata,
    /// Current lifecycle state.
    pub status: DocumentStatus,
    /// Last recorded processing error.
    pub error_message: Option<String>,
    /// User that uploaded the document.
    pub created_by: Uuid,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the file was received.
    #[serde(with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
    /// When processing completed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

/// Fields required to create a document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Owning organization.
    pub organization_id: Option<Uuid>,
    /// Resolved folder.
    pub folder_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Upload path relative to the storage root.
    pub file_path: String,
    /// Artifact path relative to the artifact root.
    pub artifact_path: String,
    /// Upload metadata.
    pub metadata: Metadata,
    /// Initial status (`queued`, or `completed` for bypassed folders).
    pub status: DocumentStatus,
    /// Uploading user.
    pub created_by: Uuid,
}

/// Filter and pagination for document listings.
#[derive(Debug, Clone, Copy)]
pub struct DocumentFilter {
    /// Restrict to one organization; `None` spans all organizations.
    pub organization_id: Option<Uuid>,
    /// Restrict to one folder; `None` lists everything in scope.
    pub folder_id: Option<Uuid>,
    /// 1-indexed page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl DocumentFilter {
    /// Row offset for the requested page.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.limit)
    }
}

/// Status projection returned by lookups and listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// Document identifier.
    pub document_id: i64,
    /// Display name.
    pub name: String,
    /// Relative upload path.
    pub file_path: String,
    /// Containing folder.
    pub folder_id: Option<Uuid>,
    /// Upload metadata.
    pub metadata: Metadata,
    /// Current lifecycle state.
    pub status: DocumentStatus,
    /// Last recorded error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Row creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Upload time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
    /// Completion time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

impl From<Document> for DocumentInfo {
    fn from(document: Document) -> Self {
        Self {
            document_id: document.id,
            name: document.name,
            file_path: document.file_path,
            folder_id: document.folder_id,
            metadata: document.metadata,
            status: document.status,
            error_message: document.error_message,
            created_at: document.created_at,
            uploaded_at: document.uploaded_at,
            processed_at: document.processed_at,
        }
    }
}

/// Persisted folder row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Folder identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Parent folder, `None` at the root.
    pub parent_id: Option<Uuid>,
    /// Folder name.
    pub name: String,
    /// Materialized path such as `/Resources/Q3`.
    pub path: String,
    /// Creating user.
    pub created_by: Uuid,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields required to create a folder.
#[derive(Debug, Clone)]
pub struct NewFolder {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Parent folder.
    pub parent_id: Option<Uuid>,
    /// Folder name.
    pub name: String,
    /// Materialized path.
    pub path: String,
    /// Creating user.
    pub created_by: Uuid,
}
