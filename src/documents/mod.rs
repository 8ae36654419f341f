//! Document and folder records, their persistence, and folder resolution rules.

pub mod folders;
pub mod repository;
pub mod sqlite;
pub mod types;

pub use folders::{FolderResolver, RESOURCES_FOLDER, is_reports_folder};
pub use repository::{DocumentRepository, FolderRepository, RepositoryError};
pub use sqlite::SqliteRepository;
pub use types::{
    Document, DocumentFilter, DocumentInfo, DocumentStatus, Folder, Metadata, NewDocument,
    NewFolder,
};
