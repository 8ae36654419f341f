//! Hybrid vector index integration.

pub mod client;
pub mod types;

pub use client::{VectorIndex, VectorSettings, WeaviateService};
pub use types::{
    ArtifactChunk, Chunk, ContentMode, IndexSummary, VectorError, collection_name,
};
