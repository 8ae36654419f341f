//! Model Context Protocol (MCP) surface for agent callers.
//!
//! Exposes the retry-aware search protocol and nothing else:
//!
//! - Tools: `document_search` (formatted text) and `document_search_json` (structured).
//! - Resources: `mcp://usage` (call policy and retry strategy) and `mcp://settings`
//!   (effective search defaults).
//!
//! The server is transport-agnostic; `docpipe-mcp` serves it over SSE (`/sse` + `/message`)
//! or stdio.

mod format;
pub mod handlers;
mod registry;
mod schemas;
mod server;

pub use server::DocpipeMcpServer;
