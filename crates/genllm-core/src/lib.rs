//! Core abstractions for genllm
//!
//! This crate defines the provider-agnostic conversation types, the
//! per-agent LLM configuration and the [`ChatAgent`] trait every
//! vendor-backed agent implements.

pub mod agent;
pub mod config;
pub mod error;
pub mod messages;

pub use agent::{ChatAgent, ChatResponse, ModelReply, TokenUsage};
pub use config::LLMConfig;
pub use error::{Error, Result};
pub use messages::{ContentBlock, Message, MessageContent, Role};
