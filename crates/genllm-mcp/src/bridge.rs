//! Register MCP server tools in a [`ToolRegistry`]
//!
//! Each remote tool becomes a [`ToolDefinition`] built from its sanitized
//! `inputSchema` and an async proxy handler that forwards the call to the
//! client. Remote failures surface as tool errors, which the execution loop
//! sanitizes like any other tool failure.

use std::sync::Arc;

use anyhow::{anyhow, bail};
use genllm_tools::{ToolDefinition, ToolHandler, ToolRegistry};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::Result;
use crate::client::{MCPClient, MCPContent, MCPToolDefinition};

/// Text returned for a successful call with no content
const EMPTY_RESULT: &str = "Success";

/// List the server's tools and register a proxy for each
///
/// A tool that cannot be registered (name taken, unusable schema) is logged
/// and skipped. Returns the names that were registered, in server order.
pub async fn load_into(client: Arc<dyn MCPClient>, registry: &ToolRegistry) -> Result<Vec<String>> {
    let tools = client.list_tools().await?;
    info!(tool_count = tools.len(), "Found tools on MCP server");

    let mut loaded = Vec::with_capacity(tools.len());
    for tool in tools {
        let name = tool.name.clone();
        match proxy_definition(Arc::clone(&client), tool).and_then(|definition| registry.register(definition)) {
            Ok(()) => {
                info!(tool_name = %name, "Registered MCP tool");
                loaded.push(name);
            }
            Err(e) => error!(tool_name = %name, error = %e, "Failed to register MCP tool"),
        }
    }
    Ok(loaded)
}

fn proxy_definition(client: Arc<dyn MCPClient>, tool: MCPToolDefinition) -> genllm_tools::Result<ToolDefinition> {
    let description = tool
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Tool {} provided by MCP server.", tool.name));

    let remote_name = tool.name.clone();
    let handler = ToolHandler::from_async(move |args| {
        let client = Arc::clone(&client);
        let name = remote_name.clone();
        async move {
            if !client.is_connected() {
                bail!("cannot call tool '{name}': MCP session is not active");
            }
            debug!(tool_name = %name, "Delegating tool call to MCP server");
            let result = client.call_tool(&name, Value::Object(args)).await?;
            let text = content_text(&result.content);
            if result.is_error.unwrap_or(false) {
                return Err(anyhow!("MCP tool '{name}' returned an error: {text}"));
            }
            Ok(Value::String(text))
        }
    });

    ToolDefinition::with_schema(tool.name, description, tool.input_schema, handler)
}

/// Flatten content blocks into the text handed back to the model
///
/// Text blocks are kept verbatim; other blocks become bracketed
/// placeholders. Empty content reads as `"Success"`.
pub fn content_text(content: &[MCPContent]) -> String {
    if content.is_empty() {
        return EMPTY_RESULT.to_string();
    }
    content
        .iter()
        .map(|block| match block {
            MCPContent::Text { text } => text.clone(),
            MCPContent::Image { mime_type, .. } => format!("[Image: {mime_type}]"),
            MCPContent::Resource { resource } => format!("[Resource: {}]", resource.uri),
            MCPContent::Unsupported => "[Unsupported content]".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
