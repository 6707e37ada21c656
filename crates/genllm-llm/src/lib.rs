//! Vendor layer for genllm
//!
//! This crate connects the provider-agnostic conversation model to concrete
//! LLM APIs. It includes:
//!
//! - The tool adapter contract the execution loop drives ([`adapter`])
//! - A JSON transport over HTTP, with retry on transient failures
//! - Completion request types
//! - Concrete vendors (behind feature flags)

pub mod adapter;
pub mod completion;
pub mod error;
pub mod retry;
pub mod transport;

// Re-export main types
pub use adapter::{ToolAdapter, Vendor, VendorSession};
pub use completion::{CompletionRequest, CompletionRequestBuilder};
pub use error::{LLMError, Result};
pub use retry::{RetryPolicy, RetryTransport, with_retry};
pub use transport::{ChatTransport, HttpTransport};

pub mod providers;
