//! Error types for MCP operations

use thiserror::Error;

/// Errors that can occur during MCP operations
#[derive(Error, Debug)]
pub enum MCPError {
    /// MCP connection failed
    #[error("MCP connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected to MCP server
    #[error("Not connected to MCP server")]
    NotConnected,

    /// MCP request failed
    #[error("MCP request failed: {0}")]
    RequestFailed(String),

    /// MCP tool call failed
    #[error("MCP tool call failed: {0}")]
    ToolCallFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<MCPError> for genllm_core::Error {
    fn from(err: MCPError) -> Self {
        match err {
            MCPError::ConfigError(msg) => genllm_core::Error::Configuration(msg),
            other => genllm_core::Error::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core_error() {
        let err: genllm_core::Error = MCPError::ConfigError("empty command".into()).into();
        assert!(matches!(err, genllm_core::Error::Configuration(_)));

        let err: genllm_core::Error = MCPError::NotConnected.into();
        assert!(matches!(err, genllm_core::Error::Provider(msg) if msg == "Not connected to MCP server"));
    }
}
