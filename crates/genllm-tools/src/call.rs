//! Tool call protocol
//!
//! [`ToolCallRequest`] is what a vendor session extracts from a model
//! response; [`ToolCallResult`] is what goes back. Failure messages are
//! fixed strings so nothing from a parser, a panic or a tool body leaks
//! into the conversation.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Arguments, ToolError};

/// Detail for argument payloads that do not decode to a JSON object
pub const MALFORMED_ARGUMENTS: &str = "payload is not a valid JSON object";

/// Message sent to the model when a tool body fails
pub const INTERNAL_TOOL_ERROR: &str = "an internal error occurred during tool execution";

/// Argument payload as the vendor delivered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawArguments {
    /// JSON text (OpenAI-style `function.arguments`)
    Json(String),
    /// Already-decoded value (Anthropic-style `input`)
    Structured(Value),
    /// No payload at all
    Absent,
}

impl RawArguments {
    /// Decode into an argument object
    ///
    /// Absent, empty, whitespace-only and `null` payloads all mean "no
    /// arguments". Anything that is not a JSON object yields
    /// [`MALFORMED_ARGUMENTS`].
    pub fn normalize(&self) -> Result<Arguments, String> {
        match self {
            Self::Absent => Ok(Arguments::new()),
            Self::Json(text) => {
                if text.trim().is_empty() {
                    return Ok(Arguments::new());
                }
                let parsed: Value =
                    serde_json::from_str(text).map_err(|_| MALFORMED_ARGUMENTS.to_string())?;
                Self::Structured(parsed).normalize()
            }
            Self::Structured(Value::Null) => Ok(Arguments::new()),
            Self::Structured(Value::Object(map)) => Ok(map.clone()),
            Self::Structured(Value::String(text)) => Self::Json(text.clone()).normalize(),
            Self::Structured(_) => Err(MALFORMED_ARGUMENTS.to_string()),
        }
    }
}

/// A model-issued request to run one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned id correlating the call with its result
    pub call_id: String,
    /// Requested tool name
    pub name: String,
    /// Raw argument payload
    pub arguments: RawArguments,
}

impl ToolCallRequest {
    /// Create a request
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: RawArguments) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Category of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool name is not registered
    NotFound,
    /// The arguments did not decode or validate
    InvalidArguments,
    /// The tool missed its deadline
    Timeout,
    /// The tool body failed
    Execution,
}

/// Outcome of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool returned a value
    Success(Value),
    /// The call failed; `message` is safe to show the model
    Failure {
        /// Failure category
        kind: FailureKind,
        /// Sanitized message
        message: String,
    },
}

/// Result of one call, keyed by its call id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Id of the originating request
    pub call_id: String,
    /// Tool name from the request
    pub name: String,
    /// Success value or sanitized failure
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    /// Successful result
    pub fn success(request: &ToolCallRequest, value: Value) -> Self {
        Self {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            outcome: ToolOutcome::Success(value),
        }
    }

    /// Failed result with a sanitized message derived from `error`
    pub fn failure(request: &ToolCallRequest, error: &ToolError) -> Self {
        let (kind, message) = match error {
            ToolError::NotFound(name) => (FailureKind::NotFound, format!("tool '{name}' is not registered")),
            ToolError::InvalidArguments(detail) => (FailureKind::InvalidArguments, format!("invalid arguments: {detail}")),
            ToolError::Timeout(limit) => (
                FailureKind::Timeout,
                format!("tool execution timed out after {limit:?}"),
            ),
            _ => (FailureKind::Execution, INTERNAL_TOOL_ERROR.to_string()),
        };
        Self {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            outcome: ToolOutcome::Failure { kind, message },
        }
    }

    /// Whether the call failed
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    /// `{"result": value}` or `{"error": message}`
    pub fn payload(&self) -> Value {
        match &self.outcome {
            ToolOutcome::Success(value) => json!({ "result": value }),
            ToolOutcome::Failure { message, .. } => json!({ "error": message }),
        }
    }

    /// [`payload`](Self::payload) serialized as JSON text
    pub fn payload_text(&self) -> String {
        self.payload().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_payloads_mean_no_arguments() {
        for raw in [
            RawArguments::Absent,
            RawArguments::Json(String::new()),
            RawArguments::Json("   \n".into()),
            RawArguments::Json("null".into()),
            RawArguments::Structured(Value::Null),
        ] {
            assert_eq!(raw.normalize(), Ok(Arguments::new()), "{raw:?}");
        }
    }

    #[test]
    fn test_malformed_payloads() {
        for raw in [
            RawArguments::Json("{\"a\": ".into()),
            RawArguments::Json("[1, 2]".into()),
            RawArguments::Json("42".into()),
            RawArguments::Structured(json!(true)),
        ] {
            assert_eq!(raw.normalize().unwrap_err(), MALFORMED_ARGUMENTS);
        }
    }

    #[test]
    fn test_object_payloads() {
        let from_text = RawArguments::Json("{\"a\": 1}".into()).normalize().unwrap();
        let from_value = RawArguments::Structured(json!({"a": 1})).normalize().unwrap();
        assert_eq!(from_text, from_value);
    }

    #[test]
    fn test_invalid_arguments_marker() {
        let request = ToolCallRequest::new("c1", "add", RawArguments::Json("{oops".into()));
        let detail = request.arguments.normalize().unwrap_err();
        let result = ToolCallResult::failure(&request, &ToolError::InvalidArguments(detail));
        assert_eq!(
            result.payload(),
            json!({"error": "invalid arguments: payload is not a valid JSON object"})
        );
    }

    #[test]
    fn test_failure_messages_are_sanitized() {
        let request = ToolCallRequest::new("c1", "read_file", RawArguments::Absent);
        let err = ToolError::Execution("No such file: /etc/secret at src/io.rs:42".into());
        let result = ToolCallResult::failure(&request, &err);
        assert!(result.is_error());
        assert_eq!(result.payload(), json!({"error": INTERNAL_TOOL_ERROR}));

        let timeout = ToolCallResult::failure(&request, &ToolError::Timeout(Duration::from_secs(3)));
        assert_eq!(
            timeout.payload_text(),
            "{\"error\":\"tool execution timed out after 3s\"}"
        );
    }
}
