//! Contract with the external document processor.
//!
//! The processor is a separate program: it receives the source file path and the desired
//! artifact path, and writes a JSON array of chunks to the artifact path. Nothing else crosses
//! the boundary.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::Config;
use crate::jobs::types::DocumentJob;
use crate::vector::ArtifactChunk;

/// Errors raised while running the processor or reading its artifact.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The source file does not exist.
    #[error("source file not found: {0}")]
    MissingSource(String),
    /// The processor could not be launched.
    #[error("failed to launch processor: {0}")]
    Spawn(#[source] std::io::Error),
    /// The processor exceeded its time budget and was killed.
    #[error("processor timed out after {0:?}")]
    Timeout(Duration),
    /// The processor exited unsuccessfully.
    #[error("processor exited with {code:?}: {stderr}")]
    Failed {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Tail of the processor's stderr.
        stderr: String,
    },
    /// The artifact could not be read.
    #[error("failed to read artifact {path}: {source}")]
    Artifact {
        /// Artifact path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The artifact was not a valid chunk list.
    #[error("malformed artifact {path}: {source}")]
    Decode {
        /// Artifact path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Turns a source document into chunks.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Process `job.source_path`, leaving an artifact at `job.artifact_path`, and return the
    /// chunks it contains.
    async fn process(&self, job: &DocumentJob) -> Result<Vec<ArtifactChunk>, ProcessorError>;
}

/// Runs the processor as a child process: `<command> <args..> <source> <artifact>`.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

const STDERR_TAIL: usize = 2048;

impl CommandProcessor {
    /// Build a processor invocation.
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    /// Build the invocation described by the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.processor_command.clone(),
            config.processor_args.clone(),
            config.processor_timeout,
        )
    }
}

#[async_trait]
impl DocumentProcessor for CommandProcessor {
    async fn process(&self, job: &DocumentJob) -> Result<Vec<ArtifactChunk>, ProcessorError> {
        if !tokio::fs::try_exists(&job.source_path).await.unwrap_or(false) {
            return Err(ProcessorError::MissingSource(
                job.source_path.display().to_string(),
            ));
        }
        if let Some(parent) = job.artifact_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ProcessorError::Artifact {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        tracing::debug!(
            document_id = job.document_id,
            command = %self.command,
            source = %job.source_path.display(),
            artifact = %job.artifact_path.display(),
            "Launching processor"
        );

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(&job.source_path)
            .arg(&job.artifact_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProcessorError::Spawn)?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessorError::Timeout(self.timeout))?
            .map_err(ProcessorError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let start = (start..stderr.len())
                .find(|index| stderr.is_char_boundary(*index))
                .unwrap_or(stderr.len());
            return Err(ProcessorError::Failed {
                code: output.status.code(),
                stderr: stderr[start..].trim().to_string(),
            });
        }

        read_artifact(&job.artifact_path).await
    }
}

/// Load the chunk list the processor wrote.
pub async fn read_artifact(path: &Path) -> Result<Vec<ArtifactChunk>, ProcessorError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ProcessorError::Artifact {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| ProcessorError::Decode {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn job(dir: &Path, source: &str) -> DocumentJob {
        DocumentJob {
            document_id: 1,
            source_path: dir.join(source),
            artifact_path: dir.join("out").join("doc_chunks.json"),
            folder_id: None,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn reads_chunk_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc_chunks.json");
        tokio::fs::write(
            &path,
            r#"[{"chunk_id":"c1","content":"Intro","content_type":"text","page_number":1,"section_title":"Overview","chunk_index":0},
                {"content":"| a |","content_type":"table","page_number":2}]"#,
        )
        .await
        .expect("write");

        let chunks = read_artifact(&path).await.expect("artifact");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title, "Overview");
        assert_eq!(chunks[1].content_type, "table");
    }

    #[tokio::test]
    async fn malformed_artifact_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json").await.expect("write");
        let err = read_artifact(&path).await.expect_err("decode error");
        assert!(matches!(err, ProcessorError::Decode { .. }));
    }

    #[tokio::test]
    async fn missing_source_fails_before_launch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processor = CommandProcessor::new("definitely-not-a-binary", vec![], Duration::from_secs(1));
        let err = processor
            .process(&job(dir.path(), "absent.pdf"))
            .await
            .expect_err("missing source");
        assert!(matches!(err, ProcessorError::MissingSource(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_is_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("doc.pdf"), b"%PDF").await.expect("source");

        // `sh -c <script> processor <source> <artifact>` binds $1 to the source, $2 to the artifact.
        let processor = CommandProcessor::new(
            "sh",
            vec![
                "-c".into(),
                r#"printf '[{"content":"hello","content_type":"text"}]' > "$2""#.into(),
                "processor".into(),
            ],
            Duration::from_secs(10),
        );

        let chunks = processor
            .process(&job(dir.path(), "doc.pdf"))
            .await
            .expect("processed");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("doc.pdf"), b"%PDF").await.expect("source");
        let processor = CommandProcessor::new(
            "sh",
            vec!["-c".into(), "echo broken >&2; exit 3".into(), "processor".into()],
            Duration::from_secs(10),
        );

        let err = processor
            .process(&job(dir.path(), "doc.pdf"))
            .await
            .expect_err("exit 3");
        match err {
            ProcessorError::Failed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_processor_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("doc.pdf"), b"%PDF").await.expect("source");
        let processor = CommandProcessor::new(
            "sh",
            vec!["-c".into(), "sleep 5".into(), "processor".into()],
            Duration::from_millis(100),
        );

        let err = processor
            .process(&job(dir.path(), "doc.pdf"))
            .await
            .expect_err("timeout");
        assert!(matches!(err, ProcessorError::Timeout(_)));
    }
}
