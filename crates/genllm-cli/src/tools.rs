//! Demo tool set exposed by the chat REPL

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use genllm_tools::{ParamSpec, ToolRegistry};
use serde_json::json;

/// Register the demo tools on `registry`
pub fn register_demo_tools(registry: &ToolRegistry) -> genllm_tools::Result<()> {
    registry
        .tool("current_time")
        .description("Current time as seconds since the Unix epoch (UTC)")
        .blocking(|_| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock is before the Unix epoch")?;
            Ok(json!({ "unix_seconds": now.as_secs() }))
        })?;

    registry
        .tool("add_numbers")
        .description("Add two numbers and return the sum")
        .param(ParamSpec::new::<f64>("a", "First addend"))
        .param(ParamSpec::new::<f64>("b", "Second addend"))
        .func(|args| async move {
            let a = args["a"].as_f64().context("a is not a number")?;
            let b = args["b"].as_f64().context("b is not a number")?;
            Ok(json!(a + b))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genllm_tools::{RawArguments, ToolCallRequest};
    use genllm_runtime::{LoopConfig, ToolExecutionLoop};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_demo_tools() {
        let registry = Arc::new(ToolRegistry::new());
        register_demo_tools(&registry).unwrap();
        assert_eq!(registry.names(), ["current_time", "add_numbers"]);

        let tool_loop = ToolExecutionLoop::new(registry, LoopConfig::default());
        let calls = vec![
            ToolCallRequest::new("1", "add_numbers", RawArguments::Json("{\"a\": 1.5, \"b\": 2}".into())),
            ToolCallRequest::new("2", "current_time", RawArguments::Absent),
        ];
        let results = tool_loop.execute_round(1, &calls).await;
        assert_eq!(results[0].payload(), json!({"result": 3.5}));
        assert!(!results[1].is_error());
    }
}
