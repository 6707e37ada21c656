//! OpenAI chat completions vendor
//!
//! Implements [`Vendor`] for the OpenAI chat completions API and for
//! OpenAI-compatible servers (Azure OpenAI, vLLM, llama.cpp, LM Studio).
//! See: https://platform.openai.com/docs/api-reference/chat
//!
//! # Example
//!
//! ```no_run
//! use genllm_llm::providers::OpenAIConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Local deployment, no real key needed
//! let config = OpenAIConfig::new("not-needed")
//!     .with_api_base("http://localhost:8000/v1")
//!     .with_timeout(60);
//! let transport = config.transport()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genllm_core::{ContentBlock, Message, MessageContent, Role, TokenUsage};
use genllm_tools::{RawArguments, ToolCallRequest, ToolCallResult, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::adapter::{ToolAdapter, Vendor, VendorSession};
use crate::transport::{ChatTransport, HttpTransport};
use crate::{CompletionRequest, LLMError, Result};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the OpenAI transport
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL for the OpenAI API (default: "https://api.openai.com/v1")
    /// Can be customized for OpenAI-compatible APIs like Azure OpenAI, local deployments, etc.
    pub api_base: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variable
    ///
    /// Reads the API key from `OPENAI_API_KEY` environment variable.
    /// Optionally reads base URL from `OPENAI_API_BASE` if set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_OPENAI_API_BASE.to_string());

        Ok(Self {
            api_key,
            api_base,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Set custom API base URL
    ///
    /// Useful for:
    /// - Azure OpenAI: "https://YOUR_RESOURCE.openai.azure.com/openai/deployments/YOUR_DEPLOYMENT"
    /// - Local deployments: "http://localhost:8000/v1"
    /// - Other OpenAI-compatible APIs
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Build an HTTP transport for the chat completions endpoint
    pub fn transport(&self) -> Result<HttpTransport> {
        let endpoint = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        HttpTransport::new(endpoint, Duration::from_secs(self.timeout_secs))?.with_bearer_token(&self.api_key)
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI chat completions vendor
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIVendor;

impl Vendor for OpenAIVendor {
    type Session = OpenAISession;

    fn name(&self) -> &str {
        "openai"
    }

    fn open_session(
        &self,
        transport: Arc<dyn ChatTransport>,
        request: CompletionRequest,
        registry: &ToolRegistry,
    ) -> Result<OpenAISession> {
        let mut session = OpenAISession {
            transport,
            model: request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
            transcript: build_openai_messages(request.system.as_deref(), &request.messages),
            usage: TokenUsage::default(),
        };
        let declarations = session.export_tool_declarations(registry);
        if declarations.as_array().is_some_and(|tools| !tools.is_empty()) {
            session.tools = Some(declarations);
        }
        Ok(session)
    }
}

/// A conversation with an OpenAI-compatible endpoint
///
/// The native transcript is the source of truth while the session runs.
pub struct OpenAISession {
    transport: Arc<dyn ChatTransport>,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    tools: Option<Value>,
    transcript: Vec<OpenAIMessage>,
    usage: TokenUsage,
}

impl OpenAISession {
    /// Native transcript so far
    pub fn transcript(&self) -> &[OpenAIMessage] {
        &self.transcript
    }

    #[instrument(skip(self), fields(model = %self.model, messages = self.transcript.len()))]
    async fn complete(&mut self) -> Result<OpenAIResponse> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: &self.transcript,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: self.tools.as_ref(),
        };
        let body = serde_json::to_value(&request)?;
        let raw = self.transport.send(body).await?;

        let response: OpenAIResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))?;
        if response.choices.is_empty() {
            return Err(LLMError::UnexpectedResponse("No choices in response".to_string()));
        }

        if let Some(usage) = &response.usage {
            self.usage += TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);
        }
        debug!(
            finish_reason = response.finish_reason().unwrap_or("unknown"),
            tool_calls = response.message().and_then(|m| m.tool_calls.as_ref()).map_or(0, Vec::len),
            "Received response"
        );
        Ok(response)
    }
}

#[async_trait]
impl ToolAdapter for OpenAISession {
    type Response = OpenAIResponse;
    type Message = OpenAIMessage;

    fn extract_tool_calls(&self, response: &OpenAIResponse) -> Vec<ToolCallRequest> {
        response
            .message()
            .and_then(|m| m.tool_calls.as_ref())
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| {
                        ToolCallRequest::new(
                            call.id.clone(),
                            call.function.name.clone(),
                            call.function.raw_arguments(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record_model_turn(&mut self, response: &OpenAIResponse) {
        if let Some(message) = response.message() {
            self.transcript.push(message.clone());
        }
    }

    fn build_result_message(&self, result: &ToolCallResult) -> OpenAIMessage {
        OpenAIMessage {
            role: "tool".to_string(),
            content: Some(result.payload_text()),
            tool_calls: None,
            tool_call_id: Some(result.call_id.clone()),
            name: Some(result.name.clone()),
        }
    }

    async fn send_results(&mut self, messages: Vec<OpenAIMessage>) -> Result<OpenAIResponse> {
        self.transcript.extend(messages);
        self.complete().await
    }

    fn export_tool_declarations(&self, registry: &ToolRegistry) -> Value {
        Value::Array(
            registry
                .definitions()
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name(),
                            "description": tool.description(),
                            "parameters": tool.parameters(),
                        }
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl VendorSession for OpenAISession {
    async fn start(&mut self) -> Result<OpenAIResponse> {
        self.complete().await
    }

    fn response_text(&self, response: &OpenAIResponse) -> String {
        response
            .message()
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn total_usage(&self) -> TokenUsage {
        self.usage
    }

    fn into_history(self) -> Vec<Message> {
        self.transcript.into_iter().map(into_generic).collect()
    }
}

// ============================================================================
// OpenAI wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [OpenAIMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
}

/// One chat message in OpenAI format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// "system", "user", "assistant" or "tool"
    pub role: String,
    /// Text content; absent on assistant turns that only call tools
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls issued by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    /// Call id answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name on tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// A tool call in an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    /// Call id
    pub id: String,
    /// Always "function"
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function name and JSON-encoded arguments
    pub function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// Function name and arguments of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIFunctionCall {
    /// Tool name
    pub name: String,
    /// Arguments as sent by the server
    ///
    /// OpenAI sends JSON text, possibly empty. Some compatible servers send
    /// a JSON object or `null` instead. Always serialized back as text.
    #[serde(default, serialize_with = "arguments_as_text")]
    pub arguments: Option<Value>,
}

impl OpenAIFunctionCall {
    /// Arguments in the form the execution loop normalizes
    pub fn raw_arguments(&self) -> RawArguments {
        match &self.arguments {
            Some(Value::String(text)) => RawArguments::Json(text.clone()),
            Some(value) => RawArguments::Structured(value.clone()),
            None => RawArguments::Absent,
        }
    }

    /// Arguments as a structured value for the generic history
    fn input(self) -> Value {
        match self.arguments {
            Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Some(Value::Null) | None => json!({}),
            Some(value) => value,
        }
    }
}

#[allow(clippy::ref_option)]
fn arguments_as_text<S: serde::Serializer>(
    arguments: &Option<Value>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match arguments {
        Some(Value::String(text)) => serializer.serialize_str(text),
        Some(Value::Null) | None => serializer.serialize_str("{}"),
        Some(value) => serializer.serialize_str(&value.to_string()),
    }
}

/// Chat completions response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    /// Message of the first choice
    pub fn message(&self) -> Option<&OpenAIMessage> {
        self.choices.first().map(|c| &c.message)
    }

    /// Finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ============================================================================
// Conversion functions
// ============================================================================

/// Build OpenAI messages from the generic history
///
/// The system prompt goes into the messages array, unless the history
/// already opens with a system turn.
fn build_openai_messages(system: Option<&str>, messages: &[Message]) -> Vec<OpenAIMessage> {
    let mut result = Vec::new();

    let has_system = messages.first().is_some_and(|m| m.role == Role::System);
    if let Some(sys) = system.filter(|_| !has_system) {
        result.push(OpenAIMessage::text("system", sys.to_string()));
    }

    for msg in messages {
        result.extend(convert_message(msg));
    }
    result
}

/// Convert a single message to OpenAI format
///
/// This may return multiple OpenAI messages (each tool result is its own message)
fn convert_message(msg: &Message) -> Vec<OpenAIMessage> {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    };

    match &msg.content {
        Some(MessageContent::Text(text)) => vec![OpenAIMessage::text(role, text.clone())],
        Some(MessageContent::Blocks(blocks)) => convert_blocks(role, blocks),
        None => vec![OpenAIMessage::text(role, String::new())],
    }
}

/// Convert content blocks to OpenAI messages
fn convert_blocks(role: &str, blocks: &[ContentBlock]) -> Vec<OpenAIMessage> {
    let mut messages = Vec::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: part } => text.push_str(part),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                tool_calls.push(OpenAIToolCall {
                    id: id.clone(),
                    tool_type: function_type(),
                    function: OpenAIFunctionCall {
                        name: name.clone(),
                        arguments: Some(Value::String(arguments)),
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                messages.push(OpenAIMessage {
                    role: "tool".to_string(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                    name: None,
                });
            }
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        messages.insert(
            0,
            OpenAIMessage {
                role: role.to_string(),
                content: (!text.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
                name: None,
            },
        );
    }

    messages
}

/// Convert a native message back to a generic turn
fn into_generic(msg: OpenAIMessage) -> Message {
    match msg.role.as_str() {
        "system" => Message::system(msg.content.unwrap_or_default()),
        "assistant" => {
            let calls = msg.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                return Message::assistant(msg.content.unwrap_or_default());
            }
            let mut blocks = Vec::with_capacity(calls.len() + 1);
            if let Some(text) = msg.content.filter(|t| !t.is_empty()) {
                blocks.push(ContentBlock::Text { text });
            }
            blocks.extend(calls.into_iter().map(|call| ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name.clone(),
                input: call.function.input(),
            }));
            Message::blocks(Role::Assistant, blocks)
        }
        "tool" => Message::tool_result(
            msg.tool_call_id.unwrap_or_default(),
            msg.content.unwrap_or_default(),
            false,
        ),
        _ => Message::user(msg.content.unwrap_or_default()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use genllm_tools::ParamSpec;
    use serde_json::json;

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
            .tool("get_weather")
            .description("Current weather for a city")
            .param(ParamSpec::new::<String>("city", "City name"))
            .blocking(|_| Ok(json!("sunny")))
            .unwrap();
        registry
    }

    fn session(reply: Value, messages: Vec<Message>) -> OpenAISession {
        let request = CompletionRequest::builder("gpt-4o-mini")
            .messages(messages)
            .system("Be brief")
            .build();
        OpenAIVendor
            .open_session(Arc::new(Canned(reply)), request, &registry())
            .unwrap()
    }

    fn tool_call_reply() -> Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "get_weather", "arguments": ""}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        })
    }

    #[test]
    fn test_config_builder() {
        let config = OpenAIConfig::new("sk-test")
            .with_api_base("http://localhost:8000/v1/")
            .with_timeout(30);
        assert_eq!(config.timeout_secs, 30);
        let transport = config.transport().unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_from_env_without_key() {
        // SAFETY: This is a test that modifies env vars, which is safe in single-threaded test context
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        assert!(OpenAIConfig::from_env().is_err());
    }

    #[test]
    fn test_system_message_in_array() {
        let session = session(json!({}), vec![Message::user("Hi")]);
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, "system");
        assert_eq!(transcript[0].content.as_deref(), Some("Be brief"));
        assert_eq!(transcript[1].role, "user");
    }

    #[test]
    fn test_tool_declarations() {
        let session = session(json!({}), vec![]);
        let tools = session.export_tool_declarations(&registry());
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "get_weather");
        assert_eq!(tools[0]["function"]["parameters"]["required"], json!(["city"]));
    }

    #[tokio::test]
    async fn test_response_with_tool_calls() {
        let mut session = session(tool_call_reply(), vec![Message::user("Weather?")]);
        let response = session.start().await.unwrap();
        let calls = session.extract_tool_calls(&response);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].arguments, RawArguments::Json("{\"city\":\"Paris\"}".into()));
        assert_eq!(calls[1].arguments, RawArguments::Json(String::new()));
        assert_eq!(session.response_text(&response), "");
        assert_eq!(session.total_usage(), TokenUsage::new(12, 7));
    }

    #[tokio::test]
    async fn test_tool_results_round_trip_history() {
        let mut session = session(tool_call_reply(), vec![Message::user("Weather?")]);
        let response = session.start().await.unwrap();
        session.record_model_turn(&response);
        let request = &session.extract_tool_calls(&response)[0];
        let result = ToolCallResult::success(request, json!("sunny"));
        let message = session.build_result_message(&result);
        assert_eq!(message.role, "tool");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content.as_deref(), Some("{\"result\":\"sunny\"}"));
        session.transcript.push(message);

        let history = session.into_history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Message::system("Be brief"));
        assert!(history[2].has_tool_uses());
        assert_eq!(history[3].role, Role::Tool);
    }

    #[test]
    fn test_generic_tool_turns_convert() {
        let messages = vec![
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "c1".into(),
                    name: "get_weather".into(),
                    input: json!({"city": "Oslo"}),
                }],
            ),
            Message::tool_result("c1", "{\"result\":\"snow\"}", false),
        ];
        let native = build_openai_messages(None, &messages);
        assert_eq!(native.len(), 2);
        assert_eq!(native[0].content, None);
        let calls = native[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, Some(json!("{\"city\":\"Oslo\"}")));
        assert_eq!(native[1].role, "tool");
        assert_eq!(native[1].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_null_and_object_arguments_are_accepted() {
        let reply = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [
                        {"id": "call_null", "type": "function", "function": {"name": "get_weather", "arguments": null}},
                        {"id": "call_obj", "type": "function", "function": {"name": "get_weather", "arguments": {"city": "Rome"}}},
                        {"id": "call_none", "type": "function", "function": {"name": "get_weather"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let mut session = session(reply, vec![Message::user("Weather?")]);
        let response = session.start().await.unwrap();

        let calls = session.extract_tool_calls(&response);
        assert_eq!(calls[0].arguments, RawArguments::Absent);
        assert_eq!(calls[1].arguments, RawArguments::Structured(json!({"city": "Rome"})));
        assert_eq!(calls[2].arguments, RawArguments::Absent);
        assert!(calls[0].arguments.normalize().unwrap().is_empty());

        session.record_model_turn(&response);
        let wire = serde_json::to_value(&session.transcript()[1]).unwrap();
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(wire["tool_calls"][1]["function"]["arguments"], "{\"city\":\"Rome\"}");

        let history = session.into_history();
        let Some(MessageContent::Blocks(blocks)) = &history[2].content else {
            panic!("expected tool use blocks");
        };
        assert!(matches!(&blocks[0], ContentBlock::ToolUse { input, .. } if input == &json!({})));
        assert!(matches!(&blocks[1], ContentBlock::ToolUse { input, .. } if input == &json!({"city": "Rome"})));
    }

    #[tokio::test]
    async fn test_rejects_empty_choices() {
        let mut session = session(json!({"choices": []}), vec![Message::user("Hi")]);
        assert!(matches!(
            session.start().await,
            Err(LLMError::UnexpectedResponse(_))
        ));
    }
}
