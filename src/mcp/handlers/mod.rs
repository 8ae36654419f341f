//! Tool handlers for the MCP server.

use rmcp::ErrorData as McpError;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod search;

/// Deserialize arguments represented as a JSON value into the target type.
pub(crate) fn parse_arguments_value<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value)
        .map_err(|err| McpError::invalid_params(format!("Invalid arguments: {err}"), None))
}
