//! Tracing configuration and log routing.
//!
//! Logs go to stdout using a compact formatter and to a file. When `DOCPIPE_LOG_FILE` is set,
//! logs are appended to that path; otherwise a file logger is created under
//! `logs/docpipe.log`. Worker activity is chatty, so the file writer is non-blocking.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Keeps the non-blocking writer guard alive for the process lifetime.
/// - Calling it twice is harmless; the second subscriber is discarded.
pub fn init_tracing() {
    install(BoxMakeWriter::new(std::io::stdout));
}

/// Same as [`init_tracing`] but the console layer writes to stderr, leaving stdout to the
/// stdio MCP transport.
pub fn init_tracing_stderr() {
    install(BoxMakeWriter::new(std::io::stderr));
}

fn install(console: BoxMakeWriter) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer()
        .with_writer(console)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let result = if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();
        registry.with(file_layer).try_init()
    } else {
        registry.try_init()
    };

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

fn configure_file_writer() -> Option<NonBlocking> {
    if LOG_GUARD.get().is_some() {
        return None;
    }

    if let Ok(path) = std::env::var("DOCPIPE_LOG_FILE") {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        }
    } else {
        if let Err(err) = std::fs::create_dir_all("logs") {
            eprintln!("Failed to create logs directory: {err}");
            return None;
        }
        let file_appender = tracing_appender::rolling::never("logs", "docpipe.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    }
}
