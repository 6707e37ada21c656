//! Vendor-backed agent
//!
//! [`LlmAgent`] wires a [`Vendor`], a shared [`ToolRegistry`], an
//! [`LLMConfig`] and a transport together and implements [`ChatAgent`].
//! Each call opens a fresh vendor session, runs the tool execution loop on
//! it and hands the reconciled transcript back to the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use genllm_core::ChatAgent;
//! use genllm_llm::providers::{OpenAIConfig, OpenAIVendor};
//! use genllm_runtime::LlmAgent;
//! use genllm_tools::{ParamSpec, ToolRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ToolRegistry::new());
//! registry
//!     .tool("add_numbers")
//!     .description("Add two integers")
//!     .param(ParamSpec::new::<i64>("a", "First operand"))
//!     .param(ParamSpec::new::<i64>("b", "Second operand"))
//!     .blocking(|args| Ok(json!(args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0))))?;
//!
//! let agent = LlmAgent::builder(OpenAIVendor)
//!     .model("gpt-4o-mini")
//!     .transport(OpenAIConfig::from_env()?.transport()?)
//!     .registry(registry)
//!     .build()?;
//!
//! let reply = agent.ask("What is 2 + 3?", None).await?;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genllm_core::{ChatAgent, ChatResponse, Error, LLMConfig, Message, ModelReply, Result};
use genllm_llm::{ChatTransport, CompletionRequest, RetryPolicy, Vendor, VendorSession, with_retry};
use genllm_tools::ToolRegistry;
use tracing::{debug, info, instrument};

use crate::executor::{LoopConfig, ToolExecutionLoop};
use crate::history::reconcile;

/// Agent over one vendor API
pub struct LlmAgent<V: Vendor> {
    vendor: V,
    model: String,
    config: LLMConfig,
    transport: Arc<dyn ChatTransport>,
    tool_loop: ToolExecutionLoop,
}

impl<V: Vendor> LlmAgent<V> {
    /// Start building an agent for `vendor`
    pub fn builder(vendor: V) -> AgentBuilder<V> {
        AgentBuilder::new(vendor)
    }

    /// LLM configuration
    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    /// Loop configuration
    pub fn loop_config(&self) -> &LoopConfig {
        self.tool_loop.config()
    }

    /// Shared tool registry
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.tool_loop.registry()
    }

    /// Run one user turn through the model and the tool loop
    #[instrument(skip(self, history, prompt), fields(vendor = %self.vendor.name(), model = %model, history_len = history.len()))]
    async fn converse(&self, model: &str, history: Vec<Message>, prompt: &str) -> Result<(ModelReply, Vec<Message>)> {
        let mut messages = history;
        messages.push(Message::user(prompt));

        let request = CompletionRequest::builder(model)
            .messages(messages)
            .config(&self.config)
            .build();
        let mut session = self
            .vendor
            .open_session(Arc::clone(&self.transport), request, self.registry())?;

        debug!(tool_count = self.registry().len(), "Sending request to LLM");
        let first = session.start().await?;
        let outcome = self.tool_loop.run(first, &mut session).await?;

        let reply = ModelReply {
            text: session.response_text(&outcome.response),
            usage: session.total_usage(),
            tool_rounds: outcome.tool_rounds,
        };
        info!(
            tool_rounds = reply.tool_rounds,
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            response_length = reply.text.len(),
            "Agent completed"
        );

        let history = reconcile(session.into_history());
        Ok((reply, history))
    }
}

#[async_trait]
impl<V: Vendor> ChatAgent for LlmAgent<V> {
    async fn ask(&self, prompt: &str, model: Option<&str>) -> Result<ModelReply> {
        let model = model.unwrap_or(&self.model);
        let (reply, _) = self.converse(model, Vec::new(), prompt).await?;
        Ok(reply)
    }

    async fn chat(&self, history: Vec<Message>, prompt: &str) -> Result<ChatResponse> {
        let (last_response, history) = self.converse(&self.model, history, prompt).await?;
        Ok(ChatResponse {
            last_response,
            history,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn vendor(&self) -> &str {
        self.vendor.name()
    }
}

/// Builder for [`LlmAgent`]
pub struct AgentBuilder<V: Vendor> {
    vendor: V,
    model: Option<String>,
    config: LLMConfig,
    loop_config: LoopConfig,
    transport: Option<Arc<dyn ChatTransport>>,
    registry: Option<Arc<ToolRegistry>>,
    retry: RetryPolicy,
}

impl<V: Vendor> AgentBuilder<V> {
    /// Create a new builder
    pub fn new(vendor: V) -> Self {
        Self {
            vendor,
            model: None,
            config: LLMConfig::default(),
            loop_config: LoopConfig::default(),
            transport: None,
            registry: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the full LLM configuration
    pub fn config(mut self, config: LLMConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the system instruction
    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.system_instruction = Some(instruction.into());
        self
    }

    /// Set temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set max output tokens
    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.config.max_output_tokens = max_output_tokens;
        self
    }

    /// Set the full loop configuration
    pub fn loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }

    /// Set the tool round limit
    pub fn max_function_loops(mut self, max: usize) -> Self {
        self.loop_config.max_function_loops = max;
        self
    }

    /// Set the per-call tool timeout
    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.loop_config.tool_timeout = timeout;
        self
    }

    /// Set the transport
    pub fn transport(self, transport: impl ChatTransport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Set a transport shared with other agents
    pub fn shared_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the tool registry (shared with other agents)
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the retry policy applied to every model call
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<LlmAgent<V>> {
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::Configuration("Model not set".to_string()))?;
        let transport = self
            .transport
            .ok_or_else(|| Error::Configuration("Transport not set".to_string()))?;
        self.config.validate()?;
        if self.loop_config.max_blocking_workers == 0 {
            return Err(Error::Configuration(
                "max_blocking_workers must be greater than 0".to_string(),
            ));
        }

        let registry = self.registry.unwrap_or_default();
        Ok(LlmAgent {
            vendor: self.vendor,
            model,
            config: self.config,
            transport: with_retry(transport, self.retry),
            tool_loop: ToolExecutionLoop::new(registry, self.loop_config),
        })
    }
}
