//! Google Gemini vendor
//!
//! Implements [`Vendor`] for the Gemini `generateContent` REST API.
//! See: https://ai.google.dev/api/generate-content
//!
//! Gemini may omit call ids on `functionCall` parts. Such calls get a
//! positional id (`gemini-call-<n>`) inside genllm, which is never sent back
//! to the API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genllm_core::{ContentBlock, Message, MessageContent, Role, TokenUsage};
use genllm_tools::{RawArguments, ToolCallRequest, ToolCallResult, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::adapter::{ToolAdapter, Vendor, VendorSession};
use crate::transport::{ChatTransport, HttpTransport, MODEL_PLACEHOLDER};
use crate::{CompletionRequest, LLMError, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const SYNTHETIC_ID_PREFIX: &str = "gemini-call-";

/// Configuration for the Gemini transport
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// Base URL (default: "https://generativelanguage.googleapis.com/v1beta")
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Create a config with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: GEMINI_API_BASE.to_string(),
            timeout_secs: 120,
        }
    }

    /// Create a config from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                LLMError::ConfigurationError("GEMINI_API_KEY environment variable not set".to_string())
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

    /// Build an HTTP transport for `models/{model}:generateContent`
    pub fn transport(&self) -> Result<HttpTransport> {
        let endpoint = format!(
            "{}/models/{MODEL_PLACEHOLDER}:generateContent",
            self.api_base.trim_end_matches('/')
        );
        HttpTransport::new(endpoint, Duration::from_secs(self.timeout_secs))?
            .with_header("x-goog-api-key", &self.api_key)
    }
}

/// Gemini `generateContent` vendor
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiVendor;

impl Vendor for GeminiVendor {
    type Session = GeminiSession;

    fn name(&self) -> &str {
        "gemini"
    }

    fn open_session(
        &self,
        transport: Arc<dyn ChatTransport>,
        request: CompletionRequest,
        registry: &ToolRegistry,
    ) -> Result<GeminiSession> {
        let (system, contents) = build_gemini_contents(request.system, &request.messages);
        let mut session = GeminiSession {
            transport,
            model: request.model,
            system,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: None,
            contents,
            usage: TokenUsage::default(),
        };
        let declarations = session.export_tool_declarations(registry);
        if declarations.as_array().is_some_and(|tools| !tools.is_empty()) {
            session.tools = Some(json!([{ "functionDeclarations": declarations }]));
        }
        Ok(session)
    }
}

/// A conversation with the Gemini API
pub struct GeminiSession {
    transport: Arc<dyn ChatTransport>,
    model: String,
    system: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    tools: Option<Value>,
    contents: Vec<GeminiContent>,
    usage: TokenUsage,
}

impl GeminiSession {
    /// Native transcript so far
    pub fn contents(&self) -> &[GeminiContent] {
        &self.contents
    }

    fn request_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "contents": self.contents,
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        });
        if let Some(temperature) = self.temperature {
            body["generationConfig"]["temperature"] = json!(temperature);
        }
        if let Some(system) = &self.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if let Some(tools) = &self.tools {
            body["tools"] = tools.clone();
        }
        body
    }

    #[instrument(skip(self), fields(model = %self.model, contents = self.contents.len()))]
    async fn complete(&mut self) -> Result<GeminiResponse> {
        let raw = self.transport.send(self.request_body()).await?;

        let response: GeminiResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))?;
        if response.candidates.is_empty() {
            return Err(LLMError::UnexpectedResponse("No candidates in response".to_string()));
        }

        if let Some(usage) = &response.usage_metadata {
            self.usage += TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count);
        }
        debug!(
            finish_reason = response.finish_reason().unwrap_or("unknown"),
            function_calls = response.parts().iter().filter(|p| p.function_call.is_some()).count(),
            "Received response"
        );
        Ok(response)
    }
}

#[async_trait]
impl ToolAdapter for GeminiSession {
    type Response = GeminiResponse;
    type Message = GeminiPart;

    fn extract_tool_calls(&self, response: &GeminiResponse) -> Vec<ToolCallRequest> {
        response
            .parts()
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .enumerate()
            .map(|(index, call)| {
                let arguments = match &call.args {
                    Some(args) => RawArguments::Structured(args.clone()),
                    None => RawArguments::Absent,
                };
                ToolCallRequest::new(call_id(call.id.as_deref(), index), call.name.clone(), arguments)
            })
            .collect()
    }

    fn record_model_turn(&mut self, response: &GeminiResponse) {
        if let Some(content) = response.content() {
            self.contents.push(GeminiContent {
                role: "model".to_string(),
                parts: content.parts.clone(),
            });
        }
    }

    fn build_result_message(&self, result: &ToolCallResult) -> GeminiPart {
        let id = (!result.call_id.starts_with(SYNTHETIC_ID_PREFIX)).then(|| result.call_id.clone());
        GeminiPart::function_response(GeminiFunctionResponse {
            id,
            name: result.name.clone(),
            response: result.payload(),
        })
    }

    async fn send_results(&mut self, messages: Vec<GeminiPart>) -> Result<GeminiResponse> {
        self.contents.push(GeminiContent {
            role: "user".to_string(),
            parts: messages,
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
                        "parameters": gemini_schema(tool.parameters()),
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl VendorSession for GeminiSession {
    async fn start(&mut self) -> Result<GeminiResponse> {
        self.complete().await
    }

    fn response_text(&self, response: &GeminiResponse) -> String {
        response
            .parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    fn total_usage(&self) -> TokenUsage {
        self.usage
    }

    fn into_history(self) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.contents.len() + 1);
        if let Some(system) = self.system {
            history.push(Message::system(system));
        }
        history.extend(self.contents.into_iter().map(into_generic));
        history
    }
}

// ============================================================================
// Gemini wire types
// ============================================================================

/// One turn in Gemini format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    /// "user" or "model"
    #[serde(default)]
    pub role: String,
    /// Parts of the turn
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// One part of a turn
///
/// Fields genllm does not model (such as `thoughtSignature`) are kept and
/// sent back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn function_call(call: GeminiFunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    fn function_response(response: GeminiFunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }
}

/// A function call issued by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// The answer to a function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// `generateContent` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

impl GeminiResponse {
    /// Content of the first candidate
    pub fn content(&self) -> Option<&GeminiContent> {
        self.candidates.first().and_then(|c| c.content.as_ref())
    }

    /// Parts of the first candidate (empty when it was blocked)
    pub fn parts(&self) -> &[GeminiPart] {
        self.content().map_or(&[], |c| c.parts.as_slice())
    }

    /// Finish reason of the first candidate
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn call_id(id: Option<&str>, index: usize) -> String {
    id.map_or_else(|| format!("{SYNTHETIC_ID_PREFIX}{index}"), str::to_string)
}

/// Gemini rejects `additionalProperties` anywhere in a schema
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "additionalProperties")
                .map(|(key, value)| (key.clone(), gemini_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

/// Split system turns out of `messages` and convert the rest
///
/// Tool results need the name of the call they answer; it is looked up
/// from the tool uses seen earlier in the history.
fn build_gemini_contents(system: Option<String>, messages: &[Message]) -> (Option<String>, Vec<GeminiContent>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut call_names: HashMap<String, String> = HashMap::new();
    let mut out: Vec<GeminiContent> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                if let Some(text) = msg.text() {
                    system_parts.push(text);
                }
                continue;
            }
            Role::Assistant => "model",
            Role::User | Role::Tool => "user",
        };
        let parts = to_parts(msg.content.as_ref(), &mut call_names);

        let merge_into = out.last_mut().filter(|last| {
            msg.role == Role::Tool
                && last.role == "user"
                && last.parts.iter().all(|p| p.function_response.is_some())
        });
        if let Some(last) = merge_into {
            last.parts.extend(parts);
            continue;
        }
        out.push(GeminiContent {
            role: role.to_string(),
            parts,
        });
    }

    let system = system.or_else(|| (!system_parts.is_empty()).then(|| system_parts.join("\n")));
    (system, out)
}

fn to_parts(content: Option<&MessageContent>, call_names: &mut HashMap<String, String>) -> Vec<GeminiPart> {
    match content {
        Some(MessageContent::Text(text)) => vec![GeminiPart::text(text.clone())],
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => GeminiPart::text(text.clone()),
                ContentBlock::ToolUse { id, name, input } => {
                    call_names.insert(id.clone(), name.clone());
                    GeminiPart::function_call(GeminiFunctionCall {
                        id: native_id(id),
                        name: name.clone(),
                        args: Some(object_args(input)),
                    })
                }
                ContentBlock::ToolResult {
                    tool_use_id, content, ..
                } => GeminiPart::function_response(GeminiFunctionResponse {
                    id: native_id(tool_use_id),
                    name: call_names.get(tool_use_id).cloned().unwrap_or_default(),
                    response: result_object(content),
                }),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn native_id(id: &str) -> Option<String> {
    (!id.starts_with(SYNTHETIC_ID_PREFIX)).then(|| id.to_string())
}

fn object_args(input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    }
}

/// `functionResponse.response` must be an object
fn result_object(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(parsed @ Value::Object(_)) => parsed,
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": content }),
    }
}

fn into_generic(content: GeminiContent) -> Message {
    let only_results = !content.parts.is_empty() && content.parts.iter().all(|p| p.function_response.is_some());
    let role = match content.role.as_str() {
        "model" => Role::Assistant,
        _ if only_results => Role::Tool,
        _ => Role::User,
    };

    let mut blocks = Vec::with_capacity(content.parts.len());
    let mut calls = 0;
    let mut responses = 0;
    for part in content.parts {
        if let Some(text) = part.text {
            blocks.push(ContentBlock::Text { text });
        }
        if let Some(call) = part.function_call {
            blocks.push(ContentBlock::ToolUse {
                id: call_id(call.id.as_deref(), calls),
                name: call.name,
                input: call.args.unwrap_or_else(|| json!({})),
            });
            calls += 1;
        }
        if let Some(response) = part.function_response {
            blocks.push(ContentBlock::ToolResult {
                tool_use_id: call_id(response.id.as_deref(), responses),
                is_error: response.response.get("error").is_some(),
                content: response.response.to_string(),
            });
            responses += 1;
        }
    }

    match <[ContentBlock; 1]>::try_from(blocks) {
        Ok([ContentBlock::Text { text }]) => Message {
            role,
            content: Some(MessageContent::Text(text)),
        },
        Ok([block]) => Message::blocks(role, vec![block]),
        Err(blocks) => Message::blocks(role, blocks),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use genllm_tools::ParamSpec;
    use std::sync::Mutex;

    /// Replays canned replies and keeps every request body
    struct Recorder {
        replies: Mutex<Vec<Value>>,
        bodies: Mutex<Vec<Value>>,
    }

    impl Recorder {
        fn new(mut replies: Vec<Value>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn bodies(&self) -> Vec<Value> {
            self.bodies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for Recorder {
        async fn send(&self, body: Value) -> Result<Value> {
            self.bodies.lock().unwrap().push(body);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LLMError::RequestFailed("no reply left".into()))
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

    fn session(transport: Arc<Recorder>, messages: Vec<Message>) -> GeminiSession {
        let request = CompletionRequest::builder("gemini-2.5-flash")
            .messages(messages)
            .system("Be brief")
            .build();
        GeminiVendor.open_session(transport, request, &registry()).unwrap()
    }

    fn function_call_reply() -> Value {
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}, "thoughtSignature": "c2ln"},
                        {"functionCall": {"name": "get_weather"}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 12}
        })
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 50, "candidatesTokenCount": 8}
        })
    }

    #[test]
    fn test_transport_endpoint() {
        let transport = GeminiConfig::new("key").transport().unwrap();
        assert_eq!(
            transport.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
        );
    }

    #[test]
    fn test_tool_declarations_drop_additional_properties() {
        let session = session(Recorder::new(Vec::new()), Vec::new());
        let tools = session.tools.as_ref().unwrap();
        let declaration = &tools[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "get_weather");
        assert_eq!(declaration["parameters"]["required"], json!(["city"]));
        assert!(declaration["parameters"].get("additionalProperties").is_none());
    }

    #[tokio::test]
    async fn test_request_body_shape() {
        let transport = Recorder::new(vec![text_reply("Hi")]);
        let mut session = session(Arc::clone(&transport), vec![Message::user("Hello")]);
        session.start().await.unwrap();

        let body = &transport.bodies()[0];
        assert_eq!(body["model"], "gemini-2.5-flash");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief");
        assert_eq!(body["contents"][0], json!({"role": "user", "parts": [{"text": "Hello"}]}));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
    }

    #[tokio::test]
    async fn test_function_call_round_trip() {
        let transport = Recorder::new(vec![function_call_reply(), text_reply("Sunny in Paris.")]);
        let mut session = session(Arc::clone(&transport), vec![Message::user("Weather?")]);

        let response = session.start().await.unwrap();
        let calls = session.extract_tool_calls(&response);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "gemini-call-0");
        assert_eq!(calls[0].arguments, RawArguments::Structured(json!({"city": "Paris"})));
        assert_eq!(calls[1].arguments, RawArguments::Absent);

        session.record_model_turn(&response);
        let parts: Vec<GeminiPart> = calls
            .iter()
            .map(|call| session.build_result_message(&ToolCallResult::success(call, json!("sunny"))))
            .collect();
        let last = session.send_results(parts).await.unwrap();
        assert_eq!(session.response_text(&last), "Sunny in Paris.");
        assert_eq!(session.total_usage(), TokenUsage::new(80, 20));

        let second = &transport.bodies()[1];
        let model_turn = &second["contents"][1];
        assert_eq!(model_turn["role"], "model");
        assert_eq!(model_turn["parts"][0]["thoughtSignature"], "c2ln");
        let results = &second["contents"][2];
        assert_eq!(results["role"], "user");
        assert_eq!(
            results["parts"][0]["functionResponse"],
            json!({"name": "get_weather", "response": {"result": "sunny"}})
        );

        let history = session.into_history();
        assert_eq!(history[0], Message::system("Be brief"));
        assert!(history[2].has_tool_uses());
        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[4], Message::assistant("Sunny in Paris."));
    }

    #[test]
    fn test_generic_tool_turns_convert() {
        let history = vec![
            Message::system("Answer in French"),
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "call_7".into(),
                    name: "get_weather".into(),
                    input: json!({"city": "Lyon"}),
                }],
            ),
            Message::tool_result("call_7", "{\"result\":\"rain\"}", false),
        ];
        let (system, contents) = build_gemini_contents(None, &history);
        assert_eq!(system.as_deref(), Some("Answer in French"));
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "model");
        let response = contents[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "get_weather");
        assert_eq!(response.id.as_deref(), Some("call_7"));
        assert_eq!(response.response, json!({"result": "rain"}));
    }

    #[tokio::test]
    async fn test_rejects_empty_candidates() {
        let transport = Recorder::new(vec![json!({"candidates": []})]);
        let mut session = session(transport, vec![Message::user("Hi")]);
        assert!(matches!(
            session.start().await,
            Err(LLMError::UnexpectedResponse(_))
        ));
    }
}
