//! Storage layout: relative upload paths, artifact naming, and root resolution.

use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::ingest::types::IngestError;

const ARTIFACT_SUFFIX: &str = "_chunks.json";

/// Roots that relative document paths are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Where uploaded files live.
    pub resources_root: PathBuf,
    /// Where the processor writes chunk artifacts.
    pub artifacts_root: PathBuf,
}

impl StorageLayout {
    /// Build a layout from explicit roots.
    pub fn new(resources_root: impl Into<PathBuf>, artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            resources_root: resources_root.into(),
            artifacts_root: artifacts_root.into(),
        }
    }

    /// Layout configured through `RESOURCES_BASE_PATH` and `ARTIFACTS_BASE_PATH`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resources_base_path.clone(),
            config.artifacts_base_path.clone(),
        )
    }

    /// Absolute location of an uploaded file.
    pub fn source_path(&self, relative: &Path) -> PathBuf {
        self.resources_root.join(relative)
    }

    /// Absolute location of a chunk artifact.
    pub fn artifact_path(&self, relative: &Path) -> PathBuf {
        self.artifacts_root.join(relative)
    }
}

/// Check that `raw` is a non-empty relative path that stays inside its root.
pub fn validate_relative_path(raw: &str) -> Result<PathBuf, IngestError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IngestError::InvalidPath("path is empty".into()));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(IngestError::InvalidPath(format!(
                    "{trimmed} escapes the storage root"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(IngestError::InvalidPath(format!("{trimmed} is absolute")));
            }
        }
    }
    if path.file_name().is_none() {
        return Err(IngestError::InvalidPath(format!("{trimmed} has no file name")));
    }
    Ok(path.to_path_buf())
}

/// File name shown for a document.
pub fn display_name(relative: &Path) -> String {
    relative
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Artifact path for an upload: the same directory, `<stem>_chunks.json`.
pub fn artifact_relative_path(relative: &Path) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    relative.with_file_name(format!("{stem}{ARTIFACT_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_paths() {
        for raw in ["", "   ", "/etc/passwd", "../secret.pdf", "org/../../x.pdf"] {
            let err = validate_relative_path(raw).unwrap_err();
            assert!(matches!(err, IngestError::InvalidPath(_)), "{raw}");
        }
    }

    #[test]
    fn accepts_nested_relative_paths() {
        let path = validate_relative_path(" org-1/q3/report.pdf ").expect("valid");
        assert_eq!(path, PathBuf::from("org-1/q3/report.pdf"));
        assert_eq!(display_name(&path), "report.pdf");
    }

    #[test]
    fn artifact_sits_next_to_the_upload() {
        assert_eq!(
            artifact_relative_path(Path::new("org-1/q3/report.pdf")),
            PathBuf::from("org-1/q3/report_chunks.json")
        );
        assert_eq!(
            artifact_relative_path(Path::new("notes")),
            PathBuf::from("notes_chunks.json")
        );
    }

    #[test]
    fn roots_join_back_to_the_processor_paths() {
        let layout = StorageLayout::new("/srv/resources", "/srv/artifacts");
        let relative = validate_relative_path("org/a.docx").expect("valid");
        assert_eq!(
            layout.source_path(&relative),
            PathBuf::from("/srv/resources/org/a.docx")
        );
        assert_eq!(
            layout.artifact_path(&artifact_relative_path(&relative)),
            PathBuf::from("/srv/artifacts/org/a_chunks.json")
        );
    }
}
