//! Ingestion orchestrator shared by the HTTP surface.
//!
//! Uploads are persisted before anything else happens: once [`IngestionService::upload_document`]
//! returns, the document row exists even if the job queue refused the work.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::documents::{
    DocumentFilter, DocumentInfo, DocumentRepository, DocumentStatus, Folder, FolderResolver,
    NewDocument, RepositoryError, is_reports_folder,
};
use crate::ingest::paths::{
    StorageLayout, artifact_relative_path, display_name, validate_relative_path,
};
use crate::ingest::types::{
    FolderRequest, IngestError, ListRequest, UploadOutcome, UploadRequest,
};
use crate::jobs::{DocumentJob, JobSnapshot, WorkerPool};
use crate::metrics::PoolMetricsSnapshot;
use crate::search::{SearchOutcome, SearchProtocol, SearchRequest};
use crate::vector::VectorIndex;

/// Operations exposed to external surfaces.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Register an uploaded file and queue it for processing.
    async fn upload_document(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError>;

    /// Look up the durable status of a job (document).
    async fn get_job_status(&self, job_id: &str) -> Result<DocumentInfo, IngestError>;

    /// List documents newest first.
    async fn list_documents(&self, request: ListRequest)
    -> Result<Vec<DocumentInfo>, IngestError>;

    /// Remove a document and its index collections.
    async fn delete_document(&self, document_id: i64) -> Result<(), IngestError>;

    /// Resubmit a document whose job never started. Returns the job id.
    async fn reprocess_document(&self, document_id: i64) -> Result<i64, IngestError>;

    /// Create a folder.
    async fn create_folder(&self, request: FolderRequest) -> Result<Folder, IngestError>;

    /// In-memory job records of this process.
    async fn list_jobs(&self) -> Vec<JobSnapshot>;

    /// Run one hybrid search.
    async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, IngestError>;

    /// Verify the relational store answers.
    async fn health(&self) -> Result<(), IngestError>;

    /// Worker pool counters.
    fn metrics_snapshot(&self) -> PoolMetricsSnapshot;
}

/// Wires the repository, folder resolver, worker pool, and search front-end together.
pub struct IngestionService {
    documents: Arc<dyn DocumentRepository>,
    folders: FolderResolver,
    pool: Arc<WorkerPool>,
    index: Arc<dyn VectorIndex>,
    search: SearchProtocol,
    layout: StorageLayout,
}

impl IngestionService {
    /// Assemble the orchestrator from already-started components.
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        folders: FolderResolver,
        pool: Arc<WorkerPool>,
        index: Arc<dyn VectorIndex>,
        layout: StorageLayout,
    ) -> Self {
        let search = SearchProtocol::new(index.clone());
        Self {
            documents,
            folders,
            pool,
            index,
            search,
            layout,
        }
    }

    /// Folder a new upload lands in, or `None` for a folder-less document.
    async fn resolve_upload_folder(
        &self,
        request: &UploadRequest,
    ) -> Result<Option<Folder>, IngestError> {
        if let Some(folder_id) = parse_optional_folder_id(request.folder_id.as_deref())? {
            let folder = self.owned_folder(folder_id, request.organization_id).await?;
            return Ok(Some(folder));
        }

        let Some(organization_id) = request.organization_id else {
            return Ok(None);
        };
        match self
            .folders
            .get_or_create_resources_folder(organization_id, request.user_id)
            .await
        {
            Ok(folder) => Ok(Some(folder)),
            Err(err) => {
                tracing::warn!(
                    organization_id = %organization_id,
                    error = %err,
                    "Resources folder unavailable; storing document without a folder"
                );
                Ok(None)
            }
        }
    }

    async fn owned_folder(
        &self,
        folder_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<Folder, IngestError> {
        let folder = match self.folders.get_folder(folder_id).await {
            Ok(folder) => folder,
            Err(err) if err.is_not_found() => return Err(IngestError::FolderNotFound(folder_id)),
            Err(err) => return Err(err.into()),
        };
        if organization_id.is_some_and(|org| org != folder.organization_id) {
            return Err(IngestError::FolderNotFound(folder_id));
        }
        Ok(folder)
    }

    fn job_for(&self, document_id: i64, file_path: &str, artifact_path: &str) -> DocumentJob {
        DocumentJob {
            document_id,
            source_path: self.layout.source_path(Path::new(file_path)),
            artifact_path: self.layout.artifact_path(Path::new(artifact_path)),
            folder_id: None,
            metadata: Default::default(),
        }
    }
}

#[async_trait]
impl IngestApi for IngestionService {
    async fn upload_document(&self, request: UploadRequest) -> Result<UploadOutcome, IngestError> {
        let started = Instant::now();
        let relative = validate_relative_path(&request.file_path)?;
        let filename = display_name(&relative);
        let file_path = relative.to_string_lossy().into_owned();
        let artifact_path = artifact_relative_path(&relative)
            .to_string_lossy()
            .into_owned();

        let folder = self.resolve_upload_folder(&request).await?;
        let bypass = folder.as_ref().is_some_and(is_reports_folder);
        let folder_id = folder.as_ref().map(|folder| folder.id);

        let document = self
            .documents
            .create_document(NewDocument {
                organization_id: request.organization_id,
                folder_id,
                name: filename.clone(),
                file_path: file_path.clone(),
                artifact_path: artifact_path.clone(),
                metadata: request.metadata.clone(),
                status: if bypass {
                    DocumentStatus::Completed
                } else {
                    DocumentStatus::Queued
                },
                created_by: request.user_id,
            })
            .await?;

        let mut job_id = None;
        if bypass {
            tracing::info!(
                document_id = document.id,
                folder_id = ?folder_id,
                "Document stored in a Reports folder; processing skipped"
            );
        } else {
            let job = DocumentJob {
                folder_id,
                metadata: request.metadata,
                ..self.job_for(document.id, &file_path, &artifact_path)
            };
            match self.pool.submit(job).await {
                Ok(()) => job_id = Some(document.id),
                Err(err) => tracing::warn!(
                    document_id = document.id,
                    error = %err,
                    "Job submission failed; document stays queued"
                ),
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            document_id = document.id,
            filename = %filename,
            status = %document.status,
            elapsed_ms,
            "Upload registered"
        );
        Ok(UploadOutcome {
            document_id: document.id,
            filename,
            status: document.status,
            job_id,
            elapsed_ms,
        })
    }

    async fn get_job_status(&self, job_id: &str) -> Result<DocumentInfo, IngestError> {
        let id = parse_job_id(job_id)?;
        let document = self.documents.get_document(id).await?;
        Ok(document.into())
    }

    async fn list_documents(
        &self,
        request: ListRequest,
    ) -> Result<Vec<DocumentInfo>, IngestError> {
        let folder_id = parse_optional_folder_id(request.folder_id.as_deref())?;
        let documents = self
            .documents
            .list_documents(DocumentFilter {
                organization_id: request.organization_id,
                folder_id,
                page: request.page.max(1),
                limit: request.limit,
            })
            .await?;
        Ok(documents.into_iter().map(DocumentInfo::from).collect())
    }

    async fn delete_document(&self, document_id: i64) -> Result<(), IngestError> {
        self.documents.mark_deleted(document_id).await?;
        if let Err(err) = self.index.delete_document_classes(document_id).await {
            tracing::warn!(
                document_id,
                error = %err,
                "Index cleanup failed; removing the document row anyway"
            );
        }
        self.documents.purge_document(document_id).await?;
        tracing::info!(document_id, "Document deleted");
        Ok(())
    }

    async fn reprocess_document(&self, document_id: i64) -> Result<i64, IngestError> {
        let document = self.documents.get_document(document_id).await?;
        if document.status != DocumentStatus::Queued {
            return Err(IngestError::InvalidOperation(format!(
                "document {document_id} is {}; only queued documents can be resubmitted",
                document.status
            )));
        }
        let job = DocumentJob {
            folder_id: document.folder_id,
            metadata: document.metadata,
            ..self.job_for(document.id, &document.file_path, &document.artifact_path)
        };
        self.pool.submit(job).await?;
        tracing::info!(document_id, "Document resubmitted");
        Ok(document_id)
    }

    async fn create_folder(&self, request: FolderRequest) -> Result<Folder, IngestError> {
        let name = request.name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(IngestError::InvalidFolderName(request.name));
        }
        let parent_id = parse_optional_folder_id(request.parent_id.as_deref())?;
        let folder = self
            .folders
            .create_folder(request.organization_id, request.user_id, name, parent_id)
            .await
            .map_err(|err| match (err, parent_id) {
                (RepositoryError::NotFound { .. }, Some(parent)) => {
                    IngestError::FolderNotFound(parent)
                }
                (err, _) => err.into(),
            })?;
        tracing::info!(folder_id = %folder.id, path = %folder.path, "Folder created");
        Ok(folder)
    }

    async fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.pool.jobs().await
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, IngestError> {
        Ok(self.search.search(request).await?)
    }

    async fn health(&self) -> Result<(), IngestError> {
        self.documents.ping().await?;
        Ok(())
    }

    fn metrics_snapshot(&self) -> PoolMetricsSnapshot {
        self.pool.metrics()
    }
}

/// Parse a job id; job ids are document ids.
pub fn parse_job_id(raw: &str) -> Result<i64, IngestError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| IngestError::InvalidJobId(raw.to_string()))
}

/// Parse an optional folder id; blank strings count as absent.
pub fn parse_optional_folder_id(raw: Option<&str>) -> Result<Option<Uuid>, IngestError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Uuid::parse_str(value)
            .map(Some)
            .map_err(|_| IngestError::InvalidFolderId(value.to_string())),
        None => Ok(None),
    }
}
