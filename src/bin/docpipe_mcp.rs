//! Agent tool server entrypoint.
//!
//! Serves `document_search` and `document_search_json` over an SSE session (`GET /sse` plus
//! `POST /message`) or over stdio. The tools only reach the vector index through the
//! retry-aware search protocol; nothing here touches the ingestion pipeline.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use docpipe::{
    config::SearchConfig,
    logging,
    mcp::DocpipeMcpServer,
    search::SearchProtocol,
    vector::{VectorSettings, WeaviateService},
};
use rmcp::{
    service::ServiceExt,
    transport::{
        sse_server::{SseServer, SseServerConfig},
        stdio,
    },
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Sse,
    Stdio,
}

#[derive(Debug, Parser)]
#[command(name = "docpipe-mcp", version, about = "Retry-aware document search tools for agents")]
struct Cli {
    /// Session transport.
    #[arg(long, value_enum, default_value_t = Transport::Sse)]
    transport: Transport,
    /// Address for the SSE transport; defaults to `MCP_BIND`.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.transport {
        Transport::Stdio => logging::init_tracing_stderr(),
        Transport::Sse => logging::init_tracing(),
    }
    let config = SearchConfig::load().context("invalid configuration")?;

    let index = WeaviateService::new(VectorSettings::from_search_config(&config))
        .context("invalid vector index settings")?;
    let server = DocpipeMcpServer::new(SearchProtocol::new(Arc::new(index)));

    match cli.transport {
        Transport::Stdio => serve_stdio(server).await,
        Transport::Sse => serve_sse(server, cli.bind.unwrap_or(config.mcp_bind)).await,
    }
}

async fn serve_stdio(server: DocpipeMcpServer) -> Result<()> {
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;

    service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;

    Ok(())
}

async fn serve_sse(server: DocpipeMcpServer, bind: SocketAddr) -> Result<()> {
    let config = SseServerConfig {
        bind,
        sse_path: "/sse".into(),
        post_path: "/message".into(),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(Duration::from_secs(30)),
    };

    let sse = SseServer::serve_with_config(config)
        .await
        .with_context(|| format!("failed to bind SSE transport on {bind}"))?;
    let ct = sse.with_service(move || server.clone());
    tracing::info!(%bind, "MCP SSE transport listening on /sse and /message");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down MCP SSE transport");
    ct.cancel();
    Ok(())
}
