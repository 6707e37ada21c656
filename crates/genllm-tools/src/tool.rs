//! Tool trait, handlers and definitions

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::deriver::{self, check_tool_metadata, sanitize_schema};
use crate::error::Result;
use crate::schema::{ParamSpec, ToolSpec};
use crate::validator::ArgumentValidator;
use crate::Arguments;

/// Asynchronous tool body
pub type AsyncToolFn = dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// Blocking tool body, run on the blocking worker pool
pub type BlockingToolFn = dyn Fn(Arguments) -> anyhow::Result<Value> + Send + Sync;

/// Callable behind a tool
#[derive(Clone)]
pub enum ToolHandler {
    /// Awaited in place on the runtime
    Async(Arc<AsyncToolFn>),
    /// Dispatched to a blocking worker thread
    Blocking(Arc<BlockingToolFn>),
}

impl ToolHandler {
    /// Wrap an async closure
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// Wrap a synchronous closure that may block
    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    /// Whether the handler runs on the blocking pool
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async(_) => f.write_str("ToolHandler::Async"),
            Self::Blocking(_) => f.write_str("ToolHandler::Blocking"),
        }
    }
}

/// Trait for tools implemented as types
///
/// Tools are functions that the model can call. Each tool provides a name,
/// a description and its parameter declarations; the registry derives the
/// JSON schema from them.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use genllm_tools::{Arguments, Tool, schema::ParamSpec};
/// use serde_json::{Value, json};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Echo the input text" }
///     fn parameters(&self) -> Vec<ParamSpec> {
///         vec![ParamSpec::new::<String>("text", "Text to echo")]
///     }
///     async fn execute(&self, args: Arguments) -> anyhow::Result<Value> {
///         Ok(args.get("text").cloned().unwrap_or(Value::Null))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool with validated arguments
    async fn execute(&self, args: Arguments) -> anyhow::Result<Value>;

    /// Unique tool name
    fn name(&self) -> &str;

    /// What the tool does, shown to the model
    fn description(&self) -> &str;

    /// Parameter declarations in order
    fn parameters(&self) -> Vec<ParamSpec>;

    /// Full descriptor, assembled from the methods above
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            params: self.parameters(),
        }
    }
}

/// A registered tool: metadata, schema, validator and handler
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    parameters: Value,
    validator: Option<ArgumentValidator>,
    handler: ToolHandler,
}

impl ToolDefinition {
    /// Build a definition, deriving schema and validator from `spec`
    pub fn derive(spec: &ToolSpec, handler: ToolHandler) -> Result<Self> {
        let derived = deriver::derive(spec)?;
        Ok(Self {
            name: spec.name.clone(),
            description: derived.description,
            parameters: derived.parameters,
            validator: Some(derived.validator),
            handler,
        })
    }

    /// Build a definition from a hand-written JSON schema
    ///
    /// The schema is sanitized but no validator is derived; arguments only
    /// have to decode to a JSON object.
    pub fn with_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: ToolHandler,
    ) -> Result<Self> {
        let name = name.into();
        let description: String = description.into();
        let description = check_tool_metadata(&name, Some(&description))?;
        let parameters = sanitize_schema(&name, &parameters)?;
        Ok(Self {
            name,
            description,
            parameters,
            validator: None,
            handler,
        })
    }

    /// Build a definition from a [`Tool`] implementation
    pub fn from_tool(tool: Arc<dyn Tool>) -> Result<Self> {
        let spec = tool.spec();
        let handler = ToolHandler::from_async(move |args| {
            let tool = Arc::clone(&tool);
            async move { tool.execute(args).await }
        });
        Self::derive(&spec, handler)
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON schema of the parameter object
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Callable behind the tool
    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    /// Validate decoded arguments and apply defaults
    pub fn prepare_arguments(&self, args: Arguments) -> std::result::Result<Arguments, String> {
        match &self.validator {
            Some(validator) => validator.validate(args),
            None => Ok(args),
        }
    }

    /// Provider-neutral declaration: `{name, description, parameters}`
    pub fn declaration(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolError;

    struct Greeter;

    #[async_trait]
    impl Tool for Greeter {
        async fn execute(&self, args: Arguments) -> anyhow::Result<Value> {
            let name = args.get("name").and_then(Value::as_str).unwrap_or("world");
            Ok(json!(format!("hello, {name}")))
        }

        fn name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Greet someone"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::new::<String>("name", "Who to greet")]
        }
    }

    #[tokio::test]
    async fn test_from_tool_runs_execute() {
        let definition = ToolDefinition::from_tool(Arc::new(Greeter)).unwrap();
        assert_eq!(definition.name(), "greet");
        let ToolHandler::Async(call) = definition.handler() else {
            panic!("expected async handler");
        };
        let args = definition
            .prepare_arguments(Arguments::from_iter([("name".to_string(), json!("Ada"))]))
            .unwrap();
        assert_eq!(call(args).await.unwrap(), json!("hello, Ada"));
    }

    #[test]
    fn test_with_schema_requires_description() {
        let handler = ToolHandler::from_blocking(|_| Ok(Value::Null));
        let err = ToolDefinition::with_schema("noop", "  ", json!({"type": "object"}), handler).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn test_declaration_shape() {
        let handler = ToolHandler::from_blocking(|_| Ok(Value::Null));
        let definition = ToolDefinition::with_schema("noop", "Does nothing", json!({"type": "object"}), handler).unwrap();
        assert_eq!(
            definition.declaration(),
            json!({
                "name": "noop",
                "description": "Does nothing",
                "parameters": {"type": "object", "properties": {}, "additionalProperties": false}
            })
        );
        assert!(definition.handler().is_blocking());
    }
}
