//! SQLite connection handling and schema bootstrap for the relational store.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open a connection pool for `database_url`, creating the database file if needed.
///
/// In-memory URLs are pinned to a single long-lived connection, otherwise every pooled
/// connection would see its own empty database.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal))
            .await?
    };

    Ok(pool)
}

/// Create the `folders` and `documents` tables and their indexes when missing.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            parent_id TEXT,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One root folder per (organization, name); this is what keeps "Resources" unique.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_root_name
            ON folders(org_id, name) WHERE parent_id IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_child_name
            ON folders(org_id, parent_id, name) WHERE parent_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            org_id TEXT,
            folder_id TEXT,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            artifact_path TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            error_message TEXT,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            uploaded_at INTEGER,
            processed_at INTEGER,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_org ON documents(org_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_folder ON documents(folder_id)")
        .execute(pool)
        .await?;

    Ok(())
}
