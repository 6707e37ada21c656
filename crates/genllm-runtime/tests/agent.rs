//! End-to-end agent behavior over a mocked transport

use std::sync::Arc;

use async_trait::async_trait;
use genllm_core::{ChatAgent, Message, TokenUsage};
use genllm_llm::providers::{AnthropicVendor, GeminiVendor, OpenAIVendor};
use genllm_llm::{ChatTransport, RetryPolicy};
use genllm_runtime::LlmAgent;
use genllm_tools::call::INTERNAL_TOOL_ERROR;
use genllm_tools::{ParamSpec, ToolRegistry};
use mockall::{Sequence, mock};
use serde_json::{Value, json};

mock! {
    pub Transport {}

    #[async_trait]
    impl ChatTransport for Transport {
        async fn send(&self, body: Value) -> genllm_llm::Result<Value>;
        fn name(&self) -> &str;
    }
}

fn registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry
        .tool("add_numbers")
        .description("Add two integers")
        .param(ParamSpec::new::<i64>("a", "First operand"))
        .param(ParamSpec::new::<i64>("b", "Second operand"))
        .blocking(|args| Ok(json!(args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0))))
        .unwrap();
    registry
        .tool("read_secret")
        .description("Fails while reading a file")
        .func(|_| async { Err(anyhow::anyhow!("permission denied: /root/.ssh/id_rsa")) })
        .unwrap();
    Arc::new(registry)
}

fn openai_text(text: &str, prompt_tokens: u32, completion_tokens: u32) -> Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens}
    })
}

fn openai_tool_call(id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{"id": id, "type": "function", "function": {"name": name, "arguments": arguments}}]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5}
    })
}

fn last_message(body: &Value) -> &Value {
    body["messages"]
        .as_array()
        .and_then(|messages| messages.last())
        .unwrap_or(&Value::Null)
}

fn openai_agent(transport: MockTransport, max_function_loops: usize) -> LlmAgent<OpenAIVendor> {
    LlmAgent::builder(OpenAIVendor)
        .model("gpt-4o-mini")
        .system_instruction("You are a calculator.")
        .transport(transport)
        .registry(registry())
        .max_function_loops(max_function_loops)
        .retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap()
}

#[tokio::test]
async fn chat_runs_tools_and_prunes_history() {
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| {
            body["tools"][0]["function"]["name"] == "add_numbers"
                && body["messages"][0]["role"] == "system"
                && last_message(body)["content"] == "What is 2 + 3?"
        })
        .returning(|_| Ok(openai_tool_call("call_1", "add_numbers", "{\"a\": 2, \"b\": 3}")));
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| {
            let last = last_message(body);
            last["role"] == "tool" && last["tool_call_id"] == "call_1" && last["content"] == "{\"result\":5}"
        })
        .returning(|_| Ok(openai_text("2 + 3 = 5", 30, 8)));

    let agent = openai_agent(transport, 5);
    let response = agent.chat(Vec::new(), "What is 2 + 3?").await.unwrap();

    assert_eq!(response.last_response.text, "2 + 3 = 5");
    assert_eq!(response.last_response.tool_rounds, 1);
    assert_eq!(response.last_response.usage, TokenUsage::new(40, 13));
    assert_eq!(
        response.history,
        vec![
            Message::system("You are a calculator."),
            Message::user("What is 2 + 3?"),
            Message::assistant("2 + 3 = 5"),
        ]
    );
}

#[tokio::test]
async fn follow_up_chat_sends_pruned_history_only() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .withf(|body| {
            let roles: Vec<&str> = body["messages"]
                .as_array()
                .map(|messages| messages.iter().filter_map(|m| m["role"].as_str()).collect())
                .unwrap_or_default();
            roles == ["system", "user", "assistant", "user"]
        })
        .returning(|_| Ok(openai_text("Still 5.", 12, 3)));

    let agent = openai_agent(transport, 5);
    let history = vec![
        Message::system("You are a calculator."),
        Message::user("What is 2 + 3?"),
        Message::assistant("2 + 3 = 5"),
    ];
    let response = agent.chat(history, "Are you sure?").await.unwrap();

    assert_eq!(response.last_response.text, "Still 5.");
    assert_eq!(response.last_response.tool_rounds, 0);
    assert_eq!(response.history.len(), 5);
}

#[tokio::test]
async fn loop_limit_returns_last_response_and_round_count() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(3)
        .returning(|_| Ok(openai_tool_call("call_n", "add_numbers", "{\"a\": 1, \"b\": 1}")));

    let agent = openai_agent(transport, 2);
    let response = agent.chat(Vec::new(), "Keep adding").await.unwrap();

    assert_eq!(response.last_response.text, "");
    assert_eq!(response.last_response.tool_rounds, 2);
    assert_eq!(
        response.history,
        vec![Message::system("You are a calculator."), Message::user("Keep adding")]
    );
}

#[tokio::test]
async fn ask_honors_model_override() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .withf(|body| body["model"] == "gpt-4o" && body["max_tokens"] == 3000)
        .returning(|_| Ok(openai_text("Hi!", 5, 2)));

    let agent = openai_agent(transport, 5);
    let reply = agent.ask("Hello", Some("gpt-4o")).await.unwrap();

    assert_eq!(reply.text, "Hi!");
    assert_eq!(reply.usage.total(), 7);
}

#[tokio::test]
async fn anthropic_tool_failures_are_sanitized() {
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| body["system"] == "Be careful." && body["tools"][1]["name"] == "read_secret")
        .returning(|_| {
            Ok(json!({
                "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "read_secret", "input": {}},
                    {"type": "tool_use", "id": "toolu_2", "name": "add_numbers", "input": {"a": 1, "b": 2}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 15, "output_tokens": 10}
            }))
        });
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| {
            let results = &last_message(body)["content"];
            let expected_error = json!({"error": INTERNAL_TOOL_ERROR}).to_string();
            last_message(body)["role"] == "user"
                && results[0]["tool_use_id"] == "toolu_1"
                && results[0]["is_error"] == true
                && results[0]["content"] == expected_error.as_str()
                && results[1]["tool_use_id"] == "toolu_2"
                && results[1]["content"] == "{\"result\":3}"
                && !body.to_string().contains("id_rsa")
        })
        .returning(|_| {
            Ok(json!({
                "content": [{"type": "text", "text": "I could not read the file, but 1 + 2 = 3."}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 40, "output_tokens": 12}
            }))
        });

    let agent = LlmAgent::builder(AnthropicVendor)
        .model("claude-sonnet-4-5-20250929")
        .system_instruction("Be careful.")
        .transport(transport)
        .registry(registry())
        .retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap();
    let response = agent.chat(Vec::new(), "Read the secret and add 1 and 2").await.unwrap();

    assert_eq!(response.last_response.tool_rounds, 1);
    assert_eq!(response.last_response.usage, TokenUsage::new(55, 22));
    assert_eq!(
        response.history,
        vec![
            Message::system("Be careful."),
            Message::user("Read the secret and add 1 and 2"),
            Message::assistant("I could not read the file, but 1 + 2 = 3."),
        ]
    );
}

#[tokio::test]
async fn gemini_calls_without_ids_complete_a_round() {
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| {
            let declaration = &body["tools"][0]["functionDeclarations"][0];
            body["systemInstruction"]["parts"][0]["text"] == "Be careful."
                && declaration["name"] == "add_numbers"
                && declaration["parameters"].get("additionalProperties").is_none()
        })
        .returning(|_| {
            Ok(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"functionCall": {"name": "add_numbers", "args": {"a": 1, "b": 2}}}
                    ]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 15, "candidatesTokenCount": 10}
            }))
        });
    transport
        .expect_send()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|body| {
            let last = body["contents"]
                .as_array()
                .and_then(|contents| contents.last())
                .unwrap_or(&Value::Null);
            last["role"] == "user"
                && last["parts"][0]["functionResponse"]
                    == json!({"name": "add_numbers", "response": {"result": 3}})
        })
        .returning(|_| {
            Ok(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "1 + 2 = 3."}]}}],
                "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 6}
            }))
        });

    let agent = LlmAgent::builder(GeminiVendor)
        .model("gemini-2.5-flash")
        .system_instruction("Be careful.")
        .transport(transport)
        .registry(registry())
        .retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap();
    let response = agent.chat(Vec::new(), "Add 1 and 2").await.unwrap();

    assert_eq!(response.last_response.text, "1 + 2 = 3.");
    assert_eq!(response.last_response.tool_rounds, 1);
    assert_eq!(response.last_response.usage, TokenUsage::new(45, 16));
}

#[tokio::test]
async fn agents_share_one_registry() {
    let shared = registry();
    let first = LlmAgent::builder(OpenAIVendor)
        .model("m")
        .transport(MockTransport::new())
        .registry(Arc::clone(&shared))
        .build()
        .unwrap();
    let second = LlmAgent::builder(AnthropicVendor)
        .model("m")
        .transport(MockTransport::new())
        .registry(Arc::clone(&shared))
        .build()
        .unwrap();

    assert!(Arc::ptr_eq(first.registry(), second.registry()));
    assert_eq!(first.registry().names(), ["add_numbers", "read_secret"]);
}
