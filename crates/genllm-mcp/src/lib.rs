//! Model Context Protocol (MCP) bridge for genllm
//!
//! Connects to an MCP server, lists its tools and registers a proxy for each
//! one in a [`ToolRegistry`](genllm_tools::ToolRegistry). Models then call
//! remote tools exactly like local ones.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use genllm_mcp::{MCPClient, StdioMCPClient, load_into};
//! use genllm_tools::ToolRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(StdioMCPClient::new("npx", ["-y", "@modelcontextprotocol/server-everything"]));
//! client.connect().await?;
//!
//! let registry = ToolRegistry::new();
//! let loaded = load_into(client.clone(), &registry).await?;
//! println!("Loaded {} MCP tools", loaded.len());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod client;
pub mod error;

pub use bridge::{content_text, load_into};
pub use client::stdio::{StdioMCPClient, StdioServerConfig};
pub use client::{MCPClient, MCPContent, MCPServerInfo, MCPToolDefinition, MCPToolResult};
pub use error::MCPError;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, MCPError>;
