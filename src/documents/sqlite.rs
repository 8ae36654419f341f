//! SQLite-backed [`DocumentRepository`] and [`FolderRepository`].
//!
//! Identifiers are stored as text, timestamps as unix seconds and metadata as a JSON string.
//! Soft-deleted rows keep a `deleted_at` marker and are filtered out of every read.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repository::{DocumentRepository, FolderRepository, RepositoryError};
use super::types::{
    Document, DocumentFilter, DocumentStatus, Folder, Metadata, NewDocument, NewFolder,
};

const DOCUMENT_COLUMNS: &str = "id, org_id, folder_id, name, file_path, artifact_path, metadata, \
     status, error_message, created_by, created_at, uploaded_at, processed_at";

const FOLDER_COLUMNS: &str = "id, org_id, parent_id, name, path, created_by, created_at";

/// Relational store over a shared [`SqlitePool`].
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentRepository for SqliteRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_document(&self, document: NewDocument) -> Result<Document, RepositoryError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let processed_at = (document.status == DocumentStatus::Completed).then_some(now);
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (org_id, folder_id, name, file_path, artifact_path, metadata,
                                   status, created_by, created_at, uploaded_at, processed_at,
                                   updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document.organization_id.map(|id| id.to_string()))
        .bind(document.folder_id.map(|id| id.to_string()))
        .bind(&document.name)
        .bind(&document.file_path)
        .bind(&document.artifact_path)
        .bind(metadata)
        .bind(document.status.as_str())
        .bind(document.created_by.to_string())
        .bind(now)
        .bind(now)
        .bind(processed_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_document(result.last_insert_rowid()).await
    }

    async fn get_document(&self, id: i64) -> Result<Document, RepositoryError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ? AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::document_not_found(id))?;
        document_from_row(&row)
    }

    async fn update_status(
        &self,
        id: i64,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let allowed = status.predecessors();
        if !allowed.is_empty() {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            let processed_at = (status == DocumentStatus::Completed).then_some(now);
            let error = if status == DocumentStatus::Failed {
                error
            } else {
                None
            };
            let placeholders = vec!["?"; allowed.len()].join(", ");
            let sql = format!(
                "UPDATE documents SET status = ?, error_message = COALESCE(?, error_message), \
                 uploaded_at = COALESCE(uploaded_at, ?), processed_at = COALESCE(?, processed_at), \
                 updated_at = ? WHERE id = ? AND deleted_at IS NULL AND status IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql)
                .bind(status.as_str())
                .bind(error)
                .bind(now)
                .bind(processed_at)
                .bind(now)
                .bind(id);
            for previous in allowed {
                query = query.bind(previous.as_str());
            }

            if query.execute(&self.pool).await?.rows_affected() > 0 {
                return Ok(());
            }
        }

        let current = self.get_document(id).await?;
        Err(RepositoryError::InvalidTransition {
            id,
            from: current.status,
            to: status,
        })
    }

    async fn list_documents(
        &self,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, RepositoryError> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE deleted_at IS NULL");
        if filter.organization_id.is_some() {
            sql.push_str(" AND org_id = ?");
        }
        if filter.folder_id.is_some() {
            sql.push_str(" AND folder_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(organization_id) = filter.organization_id {
            query = query.bind(organization_id.to_string());
        }
        if let Some(folder_id) = filter.folder_id {
            query = query.bind(folder_id.to_string());
        }
        let rows = query
            .bind(i64::from(filter.limit))
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn mark_deleted(&self, id: i64) -> Result<(), RepositoryError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            "UPDATE documents SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::document_not_found(id));
        }
        Ok(())
    }

    async fn purge_document(&self, id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::document_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl FolderRepository for SqliteRepository {
    async fn get_folder(&self, id: Uuid) -> Result<Folder, RepositoryError> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::folder_not_found(id))?;
        folder_from_row(&row)
    }

    async fn find_root_folder(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Option<Folder>, RepositoryError> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE org_id = ? AND parent_id IS NULL AND name = ?"
        );
        let row = sqlx::query(&sql)
            .bind(organization_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(folder_from_row).transpose()
    }

    async fn create_folder(&self, folder: NewFolder) -> Result<Folder, RepositoryError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        sqlx::query(
            r#"
            INSERT INTO folders (id, org_id, parent_id, name, path, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(folder.organization_id.to_string())
        .bind(folder.parent_id.map(|parent| parent.to_string()))
        .bind(&folder.name)
        .bind(&folder.path)
        .bind(folder.created_by.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(format!("folder '{}'", folder.path))
            }
            other => RepositoryError::Database(other),
        })?;

        self.get_folder(id).await
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document, RepositoryError> {
    let status: String = row.get("status");
    let metadata: String = row.get("metadata");
    let metadata: Metadata = serde_json::from_str(&metadata)
        .map_err(|err| RepositoryError::Corrupt(format!("metadata: {err}")))?;

    Ok(Document {
        id: row.get("id"),
        organization_id: optional_uuid(row.get("org_id"))?,
        folder_id: optional_uuid(row.get("folder_id"))?,
        name: row.get("name"),
        file_path: row.get("file_path"),
        artifact_path: row.get("artifact_path"),
        metadata,
        status: status
            .parse()
            .map_err(|err: super::types::UnknownStatus| RepositoryError::Corrupt(err.to_string()))?,
        error_message: row.get("error_message"),
        created_by: parse_uuid(&row.get::<String, _>("created_by"))?,
        created_at: timestamp(row.get("created_at"))?,
        uploaded_at: row.get::<Option<i64>, _>("uploaded_at").map(timestamp).transpose()?,
        processed_at: row.get::<Option<i64>, _>("processed_at").map(timestamp).transpose()?,
    })
}

fn folder_from_row(row: &SqliteRow) -> Result<Folder, RepositoryError> {
    Ok(Folder {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        organization_id: parse_uuid(&row.get::<String, _>("org_id"))?,
        parent_id: optional_uuid(row.get("parent_id"))?,
        name: row.get("name"),
        path: row.get("path"),
        created_by: parse_uuid(&row.get::<String, _>("created_by"))?,
        created_at: timestamp(row.get("created_at"))?,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|err| RepositoryError::Corrupt(format!("uuid '{value}': {err}")))
}

fn optional_uuid(value: Option<String>) -> Result<Option<Uuid>, RepositoryError> {
    value.as_deref().map(parse_uuid).transpose()
}

fn timestamp(seconds: i64) -> Result<OffsetDateTime, RepositoryError> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|err| RepositoryError::Corrupt(format!("timestamp {seconds}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    async fn repository() -> SqliteRepository {
        let pool = db::connect("sqlite::memory:").await.expect("pool");
        db::migrate(&pool).await.expect("migrate");
        SqliteRepository::new(pool)
    }

    fn new_document(org: Option<Uuid>, folder: Option<Uuid>, name: &str) -> NewDocument {
        NewDocument {
            organization_id: org,
            folder_id: folder,
            name: name.into(),
            file_path: format!("org/{name}"),
            artifact_path: format!("org/{name}_chunks.json"),
            metadata: json!({ "source": "test" }).as_object().cloned().unwrap_or_default(),
            status: DocumentStatus::Queued,
            created_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_fields() {
        let repo = repository().await;
        let org = Uuid::new_v4();
        let created = repo
            .create_document(new_document(Some(org), None, "a.pdf"))
            .await
            .expect("create");

        let fetched = repo.get_document(created.id).await.expect("get");
        assert_eq!(fetched, created);
        assert_eq!(fetched.organization_id, Some(org));
        assert_eq!(fetched.status, DocumentStatus::Queued);
        assert_eq!(fetched.metadata["source"], json!("test"));
        assert!(fetched.uploaded_at.is_some());
        assert!(fetched.processed_at.is_none());
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let repo = repository().await;
        let first = repo.create_document(new_document(None, None, "a")).await.expect("a");
        let second = repo.create_document(new_document(None, None, "b")).await.expect("b");
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn bypassed_documents_are_stamped_processed() {
        let repo = repository().await;
        let mut document = new_document(None, None, "report.pdf");
        document.status = DocumentStatus::Completed;
        let created = repo.create_document(document).await.expect("create");
        assert_eq!(created.status, DocumentStatus::Completed);
        assert!(created.processed_at.is_some());
    }

    #[tokio::test]
    async fn status_moves_forward_and_stamps_processed_at() {
        let repo = repository().await;
        let doc = repo.create_document(new_document(None, None, "a")).await.expect("create");

        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Embedding,
            DocumentStatus::Completed,
        ] {
            repo.update_status(doc.id, status, None).await.expect("advance");
        }

        let done = repo.get_document(doc.id).await.expect("get");
        assert_eq!(done.status, DocumentStatus::Completed);
        assert!(done.processed_at.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn regressions_are_rejected() {
        let repo = repository().await;
        let doc = repo.create_document(new_document(None, None, "a")).await.expect("create");
        repo.update_status(doc.id, DocumentStatus::Processing, None)
            .await
            .expect("processing");

        let err = repo
            .update_status(doc.id, DocumentStatus::Queued, None)
            .await
            .expect_err("regression");
        assert!(matches!(
            err,
            RepositoryError::InvalidTransition {
                from: DocumentStatus::Processing,
                to: DocumentStatus::Queued,
                ..
            }
        ));

        let err = repo
            .update_status(doc.id, DocumentStatus::Completed, None)
            .await
            .expect_err("skip embedding");
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn failure_records_error_and_is_terminal() {
        let repo = repository().await;
        let doc = repo.create_document(new_document(None, None, "a")).await.expect("create");
        repo.update_status(doc.id, DocumentStatus::Failed, Some("processor exploded"))
            .await
            .expect("fail");

        let failed = repo.get_document(doc.id).await.expect("get");
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("processor exploded"));
        assert!(failed.processed_at.is_none());

        let err = repo
            .update_status(doc.id, DocumentStatus::Processing, None)
            .await
            .expect_err("terminal");
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let repo = repository().await;
        let err = repo
            .update_status(404, DocumentStatus::Processing, None)
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_scopes_by_org_and_folder_with_pagination() {
        let repo = repository().await;
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let folder = Uuid::new_v4();

        for index in 0..3 {
            repo.create_document(new_document(Some(org_a), Some(folder), &format!("f{index}")))
                .await
                .expect("in folder");
        }
        repo.create_document(new_document(Some(org_a), None, "root"))
            .await
            .expect("root");
        repo.create_document(new_document(Some(org_b), None, "other"))
            .await
            .expect("other org");

        let page = |organization_id, folder_id, page, limit| DocumentFilter {
            organization_id,
            folder_id,
            page,
            limit,
        };

        let all_a = repo.list_documents(page(Some(org_a), None, 1, 50)).await.expect("org a");
        assert_eq!(all_a.len(), 4);
        assert_eq!(all_a[0].name, "root");

        let in_folder = repo
            .list_documents(page(Some(org_a), Some(folder), 1, 50))
            .await
            .expect("folder");
        assert_eq!(in_folder.len(), 3);

        let everyone = repo.list_documents(page(None, None, 1, 50)).await.expect("all");
        assert_eq!(everyone.len(), 5);

        let second_page = repo.list_documents(page(Some(org_a), None, 2, 3)).await.expect("p2");
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].name, "f0");
    }

    #[tokio::test]
    async fn tombstoned_rows_disappear_then_purge() {
        let repo = repository().await;
        let doc = repo.create_document(new_document(None, None, "a")).await.expect("create");

        repo.mark_deleted(doc.id).await.expect("tombstone");
        assert!(repo.get_document(doc.id).await.expect_err("hidden").is_not_found());
        assert!(repo.mark_deleted(doc.id).await.expect_err("twice").is_not_found());

        repo.purge_document(doc.id).await.expect("purge");
        assert!(repo.purge_document(doc.id).await.expect_err("gone").is_not_found());
    }

    #[tokio::test]
    async fn duplicate_root_folder_conflicts() {
        let repo = repository().await;
        let org = Uuid::new_v4();
        let new_folder = |parent_id, path: &str| NewFolder {
            organization_id: org,
            parent_id,
            name: "Resources".into(),
            path: path.into(),
            created_by: Uuid::new_v4(),
        };

        let root = repo.create_folder(new_folder(None, "/Resources")).await.expect("root");
        let err = repo
            .create_folder(new_folder(None, "/Resources"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let nested = repo
            .create_folder(new_folder(Some(root.id), "/Resources/Resources"))
            .await
            .expect("same name under a parent");
        assert_eq!(nested.parent_id, Some(root.id));

        let found = repo
            .find_root_folder(org, "Resources")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.id, root.id);
        assert!(repo
            .find_root_folder(Uuid::new_v4(), "Resources")
            .await
            .expect("lookup")
            .is_none());
    }
}
