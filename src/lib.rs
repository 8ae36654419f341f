#![deny(missing_docs)]

//! Core library for docpipe: document ingestion and retry-aware hybrid search.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Relational store connection and schema bootstrap.
pub mod db;
/// Document and folder records, persistence, and folder rules.
pub mod documents;
/// Upload orchestration over the repository, folder resolver, and worker pool.
pub mod ingest;
/// Bounded worker pool and the external document processor.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server exposing the search tools.
pub mod mcp;
/// Worker pool counters.
pub mod metrics;
/// Retry-aware search protocol.
pub mod search;
/// Hybrid vector index client.
pub mod vector;
