//! Agent runtime for genllm
//!
//! This crate provides the tool execution loop that answers model tool
//! calls, the history reconciler that prunes tool traffic from transcripts,
//! and [`LlmAgent`], which implements `ask`/`chat` on top of both.

pub mod agent;
pub mod executor;
pub mod history;

// Re-export key types
pub use agent::{AgentBuilder, LlmAgent};
pub use executor::{LoopConfig, LoopOutcome, ToolExecutionLoop};
pub use history::reconcile;
