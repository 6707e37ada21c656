//! Tool registry for managing available tools

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::schema::{ParamSpec, ToolSpec};
use crate::tool::{Tool, ToolDefinition, ToolHandler};
use crate::Arguments;

/// Registry mapping tool names to definitions
///
/// Insertion order is kept so that exported declarations are identical for
/// identical registration sequences. A registry is shared between agents
/// through an `Arc`; it is safe to read from many tasks at once.
/// Registering or unregistering while a tool loop is running is allowed by
/// the lock but leaves the in-flight round with whichever snapshot it saw.
///
/// # Example
///
/// ```
/// use genllm_tools::{ToolRegistry, schema::ParamSpec};
/// use serde_json::json;
///
/// let registry = ToolRegistry::new();
/// registry
///     .tool("add_numbers")
///     .description("Add two integers")
///     .param(ParamSpec::new::<i64>("a", "First operand"))
///     .param(ParamSpec::new::<i64>("b", "Second operand"))
///     .blocking(|args| {
///         let a = args["a"].as_i64().unwrap_or_default();
///         let b = args["b"].as_i64().unwrap_or_default();
///         Ok(json!(a + b))
///     })
///     .unwrap();
/// assert!(registry.contains("add_numbers"));
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, Arc<ToolDefinition>>>,
}

impl ToolRegistry {
    /// Create a new tool registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<ToolDefinition>>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<ToolDefinition>>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pre-built definition
    ///
    /// Fails with [`ToolError::Registration`] if the name is taken; the
    /// existing tool is left in place.
    pub fn register(&self, definition: ToolDefinition) -> Result<()> {
        let mut tools = self.write();
        if tools.contains_key(definition.name()) {
            warn!(tool_name = %definition.name(), "Rejected duplicate tool registration");
            return Err(ToolError::Registration(definition.name().to_string()));
        }
        debug!(tool_name = %definition.name(), "Registered tool");
        tools.insert(definition.name().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Derive a definition from `spec` and register it
    pub fn register_fn(&self, spec: &ToolSpec, handler: ToolHandler) -> Result<()> {
        if self.contains(&spec.name) {
            return Err(ToolError::Registration(spec.name.clone()));
        }
        self.register(ToolDefinition::derive(spec, handler)?)
    }

    /// Register a [`Tool`] implementation
    pub fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.contains(tool.name()) {
            return Err(ToolError::Registration(tool.name().to_string()));
        }
        self.register(ToolDefinition::from_tool(tool)?)
    }

    /// Start declaring a tool inline; the terminal call registers it
    pub fn tool(&self, name: impl Into<String>) -> ToolBuilder<'_> {
        ToolBuilder {
            registry: self,
            spec: ToolSpec::new(name),
        }
    }

    /// Remove a tool
    pub fn unregister(&self, name: &str) -> Result<Arc<ToolDefinition>> {
        self.write()
            .shift_remove(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.read().get(name).cloned()
    }

    /// Check whether a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Snapshot of all definitions in registration order
    pub fn definitions(&self) -> Vec<Arc<ToolDefinition>> {
        self.read().values().cloned().collect()
    }

    /// Snapshot of name to handler, in registration order
    pub fn implementations(&self) -> IndexMap<String, ToolHandler> {
        self.read()
            .iter()
            .map(|(name, def)| (name.clone(), def.handler().clone()))
            .collect()
    }

    /// Provider-neutral declarations of every tool, in registration order
    pub fn declarations(&self) -> Vec<Value> {
        self.read().values().map(|def| def.declaration()).collect()
    }

    /// Registered tool names in order
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Inline tool declaration returned by [`ToolRegistry::tool`]
///
/// Mirrors a decorator: describe the tool, then hand over the body with
/// [`handler`](Self::handler), [`blocking`](Self::blocking) or
/// [`func`](Self::func). Registration errors surface from that last call.
#[must_use = "a tool is only registered when a handler is supplied"]
pub struct ToolBuilder<'a> {
    registry: &'a ToolRegistry,
    spec: ToolSpec,
}

impl ToolBuilder<'_> {
    /// Set the tool description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.spec.params.push(param);
        self
    }

    /// Register with an explicit handler
    pub fn handler(self, handler: ToolHandler) -> Result<()> {
        self.registry.register_fn(&self.spec, handler)
    }

    /// Register with an async body
    pub fn func<F, Fut>(self, f: F) -> Result<()>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handler(ToolHandler::from_async(f))
    }

    /// Register with a blocking body
    pub fn blocking<F>(self, f: F) -> Result<()>
    where
        F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handler(ToolHandler::from_blocking(f))
    }
}
