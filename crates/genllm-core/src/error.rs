//! Error types for genllm-core

use thiserror::Error;

/// Result type alias for genllm-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent-level operations
///
/// Tool execution failures never show up here: they are absorbed into the
/// conversation so the model can correct itself. Only configuration,
/// transport and registration problems reach the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid agent or LLM configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vendor API or its transport failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool registration or validation failed
    #[error("Tool error: {0}")]
    Tool(String),
}
