//! Transport to a vendor chat endpoint
//!
//! Vendor sessions build a JSON request body and hand it to a
//! [`ChatTransport`]. The transport owns the HTTP client, the endpoint and
//! the credentials, and is shared by every session of an agent.
//!
//! An endpoint may contain [`MODEL_PLACEHOLDER`]. The `model` field is then
//! moved from the body into the URL, for APIs that address models by path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{LLMError, Result};

/// Endpoint segment replaced by the request's model
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// Sends one request body and returns the decoded response body
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// POST `body` and return the JSON response
    async fn send(&self, body: Value) -> Result<Value>;

    /// Transport name, for logging
    fn name(&self) -> &str {
        "transport"
    }
}

/// reqwest-backed [`ChatTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers,
        })
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LLMError::ConfigurationError(format!("Invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LLMError::ConfigurationError(format!("Invalid value for header {name}: {e}")))?;
        self.headers.insert(header, value);
        Ok(self)
    }

    /// Add an `Authorization: Bearer` header
    pub fn with_bearer_token(self, token: &str) -> Result<Self> {
        self.with_header("authorization", &format!("Bearer {token}"))
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL for `body`, taking the model out of the body when the endpoint
    /// addresses it by path
    fn target(&self, body: &mut Value) -> String {
        if !self.endpoint.contains(MODEL_PLACEHOLDER) {
            return self.endpoint.clone();
        }
        let model = body
            .as_object_mut()
            .and_then(|fields| fields.remove("model"))
            .and_then(|model| model.as_str().map(str::to_string))
            .unwrap_or_default();
        self.endpoint.replace(MODEL_PLACEHOLDER, &model)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    #[instrument(skip(self, body), fields(endpoint = %self.endpoint))]
    async fn send(&self, mut body: Value) -> Result<Value> {
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let url = self.target(&mut body);

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        // Handle errors
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed,
                429 => LLMError::RateLimitExceeded(error_text),
                400 | 422 => LLMError::InvalidRequest(error_text),
                404 => LLMError::ModelNotFound(model),
                _ => LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))?;
        debug!(model = %model, "Received response");
        Ok(value)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new("http://localhost:8000/v1/chat/completions", Duration::from_secs(5))
            .and_then(|t| t.with_bearer_token("sk-test"))
            .unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(transport.name(), "http");
        assert_eq!(
            transport.headers.get("authorization").unwrap(),
            "Bearer sk-test"
        );
    }

    #[test]
    fn test_model_moves_into_path() {
        let transport = HttpTransport::new(
            "https://example.test/v1beta/models/{model}:generateContent",
            Duration::from_secs(5),
        )
        .unwrap();
        let mut body = serde_json::json!({"model": "gemini-2.5-flash", "contents": []});
        assert_eq!(
            transport.target(&mut body),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(body, serde_json::json!({"contents": []}));

        let plain = HttpTransport::new("http://localhost/v1/chat/completions", Duration::from_secs(5)).unwrap();
        let mut body = serde_json::json!({"model": "m"});
        assert_eq!(plain.target(&mut body), "http://localhost/v1/chat/completions");
        assert_eq!(body["model"], "m");
    }

    #[test]
    fn test_invalid_header_value() {
        let result = HttpTransport::new("http://localhost", Duration::from_secs(5))
            .and_then(|t| t.with_header("x-api-key", "bad\nvalue"));
        assert!(matches!(result, Err(LLMError::ConfigurationError(_))));
    }
}
