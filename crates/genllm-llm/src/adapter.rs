//! Vendor adapter contract
//!
//! The execution loop only talks to a vendor through [`ToolAdapter`]: pull
//! tool calls out of a response, record the model turn, turn results into
//! native messages and send them back. [`VendorSession`] adds what the agent
//! needs around the loop (the first send, text and usage extraction, and
//! conversion of the native transcript back to provider-agnostic turns).
//! [`Vendor`] opens sessions.

use std::sync::Arc;

use async_trait::async_trait;
use genllm_core::{Message, TokenUsage};
use genllm_tools::{ToolCallRequest, ToolCallResult, ToolRegistry};
use serde_json::Value;

use crate::transport::ChatTransport;
use crate::{CompletionRequest, Result};

/// Five-operation contract consumed by the tool execution loop
#[async_trait]
pub trait ToolAdapter: Send {
    /// Native model response
    type Response: Send + Sync;

    /// Native outbound message carrying one tool result
    type Message: Send;

    /// Tool calls requested by `response`, in the order the model issued them
    fn extract_tool_calls(&self, response: &Self::Response) -> Vec<ToolCallRequest>;

    /// Append the model turn in `response` to the session transcript
    fn record_model_turn(&mut self, response: &Self::Response);

    /// Native message carrying `result`
    fn build_result_message(&self, result: &ToolCallResult) -> Self::Message;

    /// Append `messages` to the transcript and ask the model to continue
    async fn send_results(&mut self, messages: Vec<Self::Message>) -> Result<Self::Response>;

    /// Native tool declarations for every tool in `registry`
    ///
    /// Reads the registry only.
    fn export_tool_declarations(&self, registry: &ToolRegistry) -> Value;
}

/// One conversation with a vendor, from first send to final transcript
#[async_trait]
pub trait VendorSession: ToolAdapter {
    /// Send the transcript built when the session was opened
    async fn start(&mut self) -> Result<Self::Response>;

    /// Text of a response (empty when there is none)
    fn response_text(&self, response: &Self::Response) -> String;

    /// Usage summed over every response this session received
    fn total_usage(&self) -> TokenUsage;

    /// Provider-agnostic copy of the full transcript
    fn into_history(self) -> Vec<Message>;
}

/// A vendor API flavour
pub trait Vendor: Send + Sync {
    /// Session type for this vendor
    type Session: VendorSession + 'static;

    /// Vendor name, for logging
    fn name(&self) -> &str;

    /// Open a session for `request`, declaring every tool in `registry`
    fn open_session(
        &self,
        transport: Arc<dyn ChatTransport>,
        request: CompletionRequest,
        registry: &ToolRegistry,
    ) -> Result<Self::Session>;
}
