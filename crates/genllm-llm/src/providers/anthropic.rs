//! Anthropic Claude vendor
//!
//! Implements [`Vendor`] for Anthropic's Messages API.
//! See: https://docs.anthropic.com/en/api/messages

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genllm_core::{ContentBlock, Message, MessageContent, Role, TokenUsage};
use genllm_tools::{RawArguments, ToolCallRequest, ToolCallResult, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::adapter::{ToolAdapter, Vendor, VendorSession};
use crate::transport::{ChatTransport, HttpTransport};
use crate::{CompletionRequest, LLMError, Result};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic transport
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key sent as `x-api-key`
    pub api_key: String,
    /// Base URL (default: "https://api.anthropic.com/v1")
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    /// Create a config with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: ANTHROPIC_API_BASE.to_string(),
            timeout_secs: 120,
        }
    }

    /// Create a config from environment variable
    ///
    /// Reads the API key from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Build an HTTP transport for the messages endpoint
    pub fn transport(&self) -> Result<HttpTransport> {
        let endpoint = format!("{}/messages", self.api_base.trim_end_matches('/'));
        HttpTransport::new(endpoint, Duration::from_secs(self.timeout_secs))?
            .with_header("x-api-key", &self.api_key)?
            .with_header("anthropic-version", ANTHROPIC_VERSION)
    }
}

/// Anthropic Messages API vendor
///
/// Supports all Claude models including:
/// - claude-opus-4-5-20251101
/// - claude-sonnet-4-5-20250929
/// - claude-3-5-sonnet-20241022
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicVendor;

impl Vendor for AnthropicVendor {
    type Session = AnthropicSession;

    fn name(&self) -> &str {
        "anthropic"
    }

    fn open_session(
        &self,
        transport: Arc<dyn ChatTransport>,
        request: CompletionRequest,
        registry: &ToolRegistry,
    ) -> Result<AnthropicSession> {
        let (system, transcript) = build_anthropic_messages(request.system, &request.messages);
        let mut session = AnthropicSession {
            transport,
            model: request.model,
            system,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
            transcript,
            usage: TokenUsage::default(),
        };
        let declarations = session.export_tool_declarations(registry);
        if declarations.as_array().is_some_and(|tools| !tools.is_empty()) {
            session.tools = Some(declarations);
        }
        Ok(session)
    }
}

/// A conversation with the Messages API
pub struct AnthropicSession {
    transport: Arc<dyn ChatTransport>,
    model: String,
    system: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    tools: Option<Value>,
    transcript: Vec<AnthropicMessage>,
    usage: TokenUsage,
}

impl AnthropicSession {
    /// Native transcript so far
    pub fn transcript(&self) -> &[AnthropicMessage] {
        &self.transcript
    }

    /// System prompt sent with every request
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    #[instrument(skip(self), fields(model = %self.model, messages = self.transcript.len()))]
    async fn complete(&mut self) -> Result<AnthropicResponse> {
        let request = AnthropicRequest {
            model: &self.model,
            messages: &self.transcript,
            system: self.system.as_deref(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: self.tools.as_ref(),
        };
        let body = serde_json::to_value(&request)?;
        let raw = self.transport.send(body).await?;

        let response: AnthropicResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))?;

        self.usage += TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens);
        debug!(
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Received response"
        );
        Ok(response)
    }
}

#[async_trait]
impl ToolAdapter for AnthropicSession {
    type Response = AnthropicResponse;
    type Message = ContentBlock;

    fn extract_tool_calls(&self, response: &AnthropicResponse) -> Vec<ToolCallRequest> {
        response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCallRequest::new(
                    id.clone(),
                    name.clone(),
                    RawArguments::Structured(input.clone()),
                )),
                _ => None,
            })
            .collect()
    }

    fn record_model_turn(&mut self, response: &AnthropicResponse) {
        self.transcript.push(AnthropicMessage {
            role: "assistant".to_string(),
            content: response.content.clone(),
        });
    }

    fn build_result_message(&self, result: &ToolCallResult) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: result.call_id.clone(),
            content: result.payload_text(),
            is_error: result.is_error(),
        }
    }

    async fn send_results(&mut self, messages: Vec<ContentBlock>) -> Result<AnthropicResponse> {
        // Every result of one round travels in a single user turn
        self.transcript.push(AnthropicMessage {
            role: "user".to_string(),
            content: messages,
        });
        self.complete().await
    }

    fn export_tool_declarations(&self, registry: &ToolRegistry) -> Value {
        Value::Array(
            registry
                .definitions()
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "input_schema": tool.parameters(),
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl VendorSession for AnthropicSession {
    async fn start(&mut self) -> Result<AnthropicResponse> {
        self.complete().await
    }

    fn response_text(&self, response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn total_usage(&self) -> TokenUsage {
        self.usage
    }

    fn into_history(self) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.transcript.len() + 1);
        if let Some(system) = self.system {
            history.push(Message::system(system));
        }
        history.extend(self.transcript.into_iter().map(into_generic));
        history
    }
}

// Anthropic-specific request/response types
// These match the Anthropic API format exactly

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: &'a [AnthropicMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
}

/// One turn in Messages API format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Content blocks of the turn
    pub content: Vec<ContentBlock>,
}

/// Messages API response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: UsageResponse,
}

impl AnthropicResponse {
    /// Content blocks of the reply
    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UsageResponse {
    input_tokens: u32,
    output_tokens: u32,
}

/// Split system turns out of `messages` and convert the rest
///
/// The Messages API takes the system prompt as a top-level field and only
/// accepts user and assistant turns, so tool results travel as user turns.
/// Consecutive tool results are merged into one turn.
fn build_anthropic_messages(
    system: Option<String>,
    messages: &[Message],
) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        let (role, blocks) = match msg.role {
            Role::System => {
                if let Some(text) = msg.text() {
                    system_parts.push(text);
                }
                continue;
            }
            Role::User | Role::Tool => ("user", to_blocks(msg.content.as_ref())),
            Role::Assistant => ("assistant", to_blocks(msg.content.as_ref())),
        };

        let merge_into = out.last_mut().filter(|last| {
            msg.role == Role::Tool
                && last.role == "user"
                && last.content.iter().all(|b| matches!(b, ContentBlock::ToolResult { .. }))
        });
        if let Some(last) = merge_into {
            last.content.extend(blocks);
            continue;
        }
        out.push(AnthropicMessage {
            role: role.to_string(),
            content: blocks,
        });
    }

    // An explicit system instruction wins over system turns in the history
    let system = system.or_else(|| (!system_parts.is_empty()).then(|| system_parts.join("\n")));
    (system, out)
}

fn to_blocks(content: Option<&MessageContent>) -> Vec<ContentBlock> {
    match content {
        Some(MessageContent::Text(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: object_input(input),
                },
                other => other.clone(),
            })
            .collect(),
        None => Vec::new(),
    }
}

/// `tool_use.input` must be an object on this API
fn object_input(input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    }
}

fn into_generic(msg: AnthropicMessage) -> Message {
    let only_results = !msg.content.is_empty()
        && msg
            .content
            .iter()
            .all(|b| matches!(b, ContentBlock::ToolResult { .. }));
    let role = match msg.role.as_str() {
        "assistant" => Role::Assistant,
        _ if only_results => Role::Tool,
        _ => Role::User,
    };

    match <[ContentBlock; 1]>::try_from(msg.content) {
        Ok([ContentBlock::Text { text }]) => Message {
            role,
            content: Some(MessageContent::Text(text)),
        },
        Ok([block]) => Message::blocks(role, vec![block]),
        Err(blocks) => Message::blocks(role, blocks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genllm_tools::ParamSpec;

    struct Canned(Value);

    #[async_trait]
    impl ChatTransport for Canned {
        async fn send(&self, _body: Value) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .tool("lookup")
            .description("Look up a word")
            .param(ParamSpec::new::<String>("word", "Word to look up"))
            .blocking(|_| Ok(json!("a definition")))
            .unwrap();
        registry
    }

    fn tool_use_reply() -> Value {
        json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"word": "rust"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 9}
        })
    }

    #[test]
    fn test_transport_headers() {
        let transport = AnthropicConfig::new("test-key").transport().unwrap();
        assert_eq!(transport.endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_from_env_without_key() {
        // SAFETY: This is a test that modifies env vars, which is safe in single-threaded test context
        unsafe {
            std::env::remove_var("ANTHROPIC_API_KEY");
        }
        assert!(AnthropicConfig::from_env().is_err());
    }

    #[test]
    fn test_system_turns_are_lifted() {
        let history = vec![
            Message::system("Answer in French"),
            Message::user("Hello"),
        ];
        let (system, messages) = build_anthropic_messages(None, &history);
        assert_eq!(system.as_deref(), Some("Answer in French"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_consecutive_tool_results_merge() {
        let history = vec![
            Message::user("Define two words"),
            Message::blocks(
                Role::Assistant,
                vec![
                    ContentBlock::ToolUse { id: "a".into(), name: "lookup".into(), input: json!({"word": "x"}) },
                    ContentBlock::ToolUse { id: "b".into(), name: "lookup".into(), input: json!("{\"word\":\"y\"}") },
                ],
            ),
            Message::tool_result("a", "{\"result\":1}", false),
            Message::tool_result("b", "{\"result\":2}", false),
        ];
        let (_, messages) = build_anthropic_messages(None, &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content.len(), 2);
        assert!(matches!(
            &messages[1].content[1],
            ContentBlock::ToolUse { input, .. } if input == &json!({"word": "y"})
        ));
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let request = CompletionRequest::builder("claude-sonnet-4-5-20250929")
            .add_message(Message::user("Define rust"))
            .system("Be brief")
            .build();
        let mut session = AnthropicVendor
            .open_session(Arc::new(Canned(tool_use_reply())), request, &registry())
            .unwrap();
        assert_eq!(session.system(), Some("Be brief"));

        let response = session.start().await.unwrap();
        assert_eq!(session.response_text(&response), "Let me check.");
        let calls = session.extract_tool_calls(&response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, RawArguments::Structured(json!({"word": "rust"})));

        session.record_model_turn(&response);
        let result = ToolCallResult::success(&calls[0], json!("a definition"));
        let block = session.build_result_message(&result);
        session.send_results(vec![block]).await.unwrap();
        assert_eq!(session.total_usage(), TokenUsage::new(40, 18));

        let history = session.into_history();
        assert_eq!(history[0], Message::system("Be brief"));
        assert_eq!(history[1], Message::user("Define rust"));
        assert_eq!(history[2].role, Role::Assistant);
        assert!(history[2].has_tool_uses());
        assert_eq!(history[3].role, Role::Tool);
        assert!(history[3].has_tool_results());
    }

    #[test]
    fn test_tool_declarations() {
        let session = AnthropicVendor
            .open_session(
                Arc::new(Canned(json!({}))),
                CompletionRequest::builder("m").build(),
                &ToolRegistry::new(),
            )
            .unwrap();
        let tools = session.export_tool_declarations(&registry());
        assert_eq!(tools[0]["name"], "lookup");
        assert_eq!(tools[0]["input_schema"]["type"], "object");
        assert!(session.tools.is_none());
    }
}
