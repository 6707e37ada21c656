//! Core ChatAgent trait definition

use crate::{Message, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token counts reported by a vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Create a new usage record
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Final model answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Answer text (empty when the model returned none)
    pub text: String,
    /// Usage summed over every model call made for this answer
    pub usage: TokenUsage,
    /// Number of tool execution rounds that ran
    pub tool_rounds: usize,
}

/// Result of a multi-turn exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The final answer
    pub last_response: ModelReply,
    /// Reconciled history to pass into the next `chat` call
    pub history: Vec<Message>,
}

/// Conversational entry point implemented by every vendor-backed agent
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Single-turn question with no caller-managed history
    ///
    /// `model` overrides the agent's configured model for this call only.
    async fn ask(&self, prompt: &str, model: Option<&str>) -> Result<ModelReply>;

    /// Multi-turn exchange
    ///
    /// `history` comes from a previous [`ChatResponse::history`] (or is empty).
    /// The returned history has every tool-call artifact pruned.
    async fn chat(&self, history: Vec<Message>, prompt: &str) -> Result<ChatResponse>;

    /// Model the agent talks to by default
    fn model(&self) -> &str;

    /// Vendor name, for logging
    fn vendor(&self) -> &str;
}
