//! Error types for tool registration and execution

use std::time::Duration;

use thiserror::Error;

/// Result type for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors that can occur while defining, registering or running tools
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// A tool with the same name is already registered
    #[error("Tool '{0}' is already registered")]
    Registration(String),

    /// The tool definition is incomplete or unsupported
    #[error("Invalid tool definition: {0}")]
    Validation(String),

    /// The parameter structure nests deeper than the deriver allows
    #[error("Schema for tool '{tool}' exceeds the maximum depth of {limit}")]
    SchemaDepthExceeded {
        /// Tool name
        tool: String,
        /// Configured limit
        limit: usize,
    },

    /// No tool with this name is registered
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// Tool arguments failed to parse or validate
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool body returned an error or panicked
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// The tool did not complete within its deadline
    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),
}

/// Convert ToolError to genllm_core::Error
impl From<ToolError> for genllm_core::Error {
    fn from(err: ToolError) -> Self {
        genllm_core::Error::Tool(err.to_string())
    }
}
