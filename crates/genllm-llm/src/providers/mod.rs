//! Concrete vendor implementations
//!
//! Each vendor turns the generic conversation into its wire format, opens a
//! session and implements the tool adapter contract for it.

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicConfig, AnthropicSession, AnthropicVendor};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiConfig, GeminiSession, GeminiVendor};
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAISession, OpenAIVendor};
