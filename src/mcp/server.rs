//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use crate::{
    mcp::{
        format::{SearchSettingsSnapshot, json_resource_contents, serialize_json, usage_payload},
        handlers::search::{ResultFormat, handle_document_search},
        registry, schemas,
    },
    search::SearchProtocol,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, ListResourcesResult, ListToolsResult,
        RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ServerCapabilities,
        ServerInfo, Tool, ToolAnnotations,
    },
};

const SETTINGS_URI: &str = "mcp://settings";
const USAGE_URI: &str = "mcp://usage";

/// Tool returning formatted text blocks.
pub const TEXT_SEARCH_TOOL: &str = "document_search";
/// Tool returning structured JSON.
pub const JSON_SEARCH_TOOL: &str = "document_search_json";

const SEARCH_DESCRIPTION: &str = "Search documents with hybrid (semantic + keyword) retrieval. \
ALWAYS make two calls, one with mode='text' and one with mode='table', and combine the results. \
If nothing relevant comes back, retry (max 3 per mode) with the suggested lower score and \
adjusted alpha: raise alpha toward semantic for text, lower it toward keyword for tables, and \
rephrase the query. Default alpha is 0.6 for text and 0.3 for tables; default score is 0.5.";

/// MCP server exposing the retry-aware search protocol.
#[derive(Clone)]
pub struct DocpipeMcpServer {
    search: SearchProtocol,
    registry: Arc<registry::Registry>,
}

impl DocpipeMcpServer {
    /// Create a server answering tool calls through `search`.
    pub fn new(search: SearchProtocol) -> Self {
        let mut registry = registry::Registry::new();
        registry.register_resource(SETTINGS_URI, resource_settings);
        registry.register_resource(USAGE_URI, resource_usage);

        registry.register_tool(TEXT_SEARCH_TOOL, tool_document_search);
        registry.register_tool(JSON_SEARCH_TOOL, tool_document_search_json);

        Self {
            search,
            registry: Arc::new(registry),
        }
    }

    fn describe_tools(&self) -> Vec<Tool> {
        let search_schema = Arc::new(schemas::search_input_schema());
        vec![
            Tool {
                name: Cow::Borrowed(TEXT_SEARCH_TOOL),
                title: Some("Document Search".to_string()),
                description: Some(Cow::Owned(format!(
                    "{SEARCH_DESCRIPTION} Returns chunks as text with section, page, and score."
                ))),
                input_schema: search_schema.clone(),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Document Search")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed(JSON_SEARCH_TOOL),
                title: Some("Document Search (JSON)".to_string()),
                description: Some(Cow::Owned(format!(
                    "{SEARCH_DESCRIPTION} Returns structured JSON; empty results carry a `retry` block."
                ))),
                input_schema: search_schema,
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Document Search (JSON)")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
        ]
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut settings = RawResource::new(SETTINGS_URI, "settings");
        settings.description = Some("Effective search defaults and retry parameters".into());

        let mut usage = RawResource::new(USAGE_URI, "usage");
        usage.description =
            Some("Call policy: one search per mode, then retry with the suggested values".into());

        vec![settings.no_annotation(), usage.no_annotation()]
    }
}

fn resource_settings(
    _server: &DocpipeMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    Box::pin(async move {
        let payload = SearchSettingsSnapshot::current();
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(
                SETTINGS_URI,
                serialize_json(&payload, SETTINGS_URI),
            )],
        })
    })
}

fn resource_usage(
    _server: &DocpipeMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    Box::pin(async move {
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(
                USAGE_URI,
                serialize_json(&usage_payload(), USAGE_URI),
            )],
        })
    })
}

fn tool_document_search(
    server: &DocpipeMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let search = server.search.clone();
    Box::pin(
        async move { handle_document_search(&search, request.arguments, ResultFormat::Text).await },
    )
}

fn tool_document_search_json(
    server: &DocpipeMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let search = server.search.clone();
    Box::pin(
        async move { handle_document_search(&search, request.arguments, ResultFormat::Json).await },
    )
}

impl ServerHandler for DocpipeMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "docpipe".to_string();
        implementation.title = Some("docpipe document search".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: implementation,
            instructions: Some(
                "Search processed documents by collection id. Query both mode='text' and mode='table'; when a call returns no results, follow its retry hint (lower score, shifted alpha) up to three times per mode.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    #[allow(clippy::manual_async_fn)]
    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.resources.get(request.uri.as_str()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!("Unknown resource URI: {}", request.uri),
                None,
            ))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.tools.get(request.name.as_ref()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            ))
        }
    }
}
