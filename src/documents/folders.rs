//! Default landing folder resolution and processing-bypass detection.

use std::sync::Arc;

use uuid::Uuid;

use super::repository::{FolderRepository, RepositoryError};
use super::types::{Folder, NewFolder};

/// Name of the per-organization default landing folder.
pub const RESOURCES_FOLDER: &str = "Resources";

const REPORTS_SEGMENT: &str = "reports";

/// Resolves the default "Resources" folder and recognises no-processing zones.
#[derive(Clone)]
pub struct FolderResolver {
    folders: Arc<dyn FolderRepository>,
}

impl FolderResolver {
    /// Build a resolver over the given folder store.
    pub fn new(folders: Arc<dyn FolderRepository>) -> Self {
        Self { folders }
    }

    /// Return the organization's root "Resources" folder, creating it on first use.
    ///
    /// Concurrent first calls race on the insert; the loser sees a uniqueness conflict and
    /// re-reads the row the winner created.
    pub async fn get_or_create_resources_folder(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Folder, RepositoryError> {
        if let Some(folder) = self
            .folders
            .find_root_folder(organization_id, RESOURCES_FOLDER)
            .await?
        {
            return Ok(folder);
        }

        let created = self
            .folders
            .create_folder(NewFolder {
                organization_id,
                parent_id: None,
                name: RESOURCES_FOLDER.to_string(),
                path: format!("/{RESOURCES_FOLDER}"),
                created_by: user_id,
            })
            .await;

        match created {
            Ok(folder) => {
                tracing::info!(
                    organization_id = %organization_id,
                    folder_id = %folder.id,
                    "Created Resources folder"
                );
                Ok(folder)
            }
            Err(RepositoryError::Conflict(_)) => self
                .folders
                .find_root_folder(organization_id, RESOURCES_FOLDER)
                .await?
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "folder",
                    id: format!("{organization_id}/{RESOURCES_FOLDER}"),
                }),
            Err(err) => Err(err),
        }
    }

    /// Create a folder under `parent_id` (or at the root), deriving its materialized path.
    pub async fn create_folder(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Folder, RepositoryError> {
        let path = match parent_id {
            Some(parent_id) => {
                let parent = self.folders.get_folder(parent_id).await?;
                if parent.organization_id != organization_id {
                    return Err(RepositoryError::folder_not_found(parent_id));
                }
                format!("{}/{}", parent.path.trim_end_matches('/'), name)
            }
            None => format!("/{name}"),
        };

        self.folders
            .create_folder(NewFolder {
                organization_id,
                parent_id,
                name: name.to_string(),
                path,
                created_by: user_id,
            })
            .await
    }

    /// Fetch a folder by id.
    pub async fn get_folder(&self, folder_id: Uuid) -> Result<Folder, RepositoryError> {
        self.folders.get_folder(folder_id).await
    }
}

/// Whether documents placed in `folder` skip the processing pipeline.
///
/// True when the folder itself is named "reports" or its materialized path contains
/// `/reports`, compared case-insensitively, so descendants of a Reports folder are covered.
pub fn is_reports_folder(folder: &Folder) -> bool {
    folder.name.eq_ignore_ascii_case(REPORTS_SEGMENT)
        || folder
            .path
            .to_ascii_lowercase()
            .contains(&format!("/{REPORTS_SEGMENT}"))
}
