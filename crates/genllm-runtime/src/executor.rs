//! Tool execution loop
//!
//! The loop drives a [`ToolAdapter`] through rounds:
//! 1. Extract tool calls from the latest model response
//! 2. If there are none, record the turn and stop
//! 3. Otherwise record the turn, run every call concurrently and send the
//!    results back, which yields the next response
//!
//! A round never fails because of a tool. Unknown tools, bad arguments,
//! timeouts and tool errors all become sanitized results the model can react
//! to. Only the network call in `send_results` can end the loop with an error.
//!
//! Blocking tool bodies run on tokio's blocking pool, gated by a semaphore
//! of `max_blocking_workers` permits. A blocking body that times out cannot
//! be cancelled; it keeps its worker thread until it returns and its result
//! is discarded. The same holds when the caller drops the loop future.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use genllm_llm::ToolAdapter;
use genllm_tools::{Arguments, ToolCallRequest, ToolCallResult, ToolError, ToolHandler, ToolRegistry};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Default number of tool rounds per chat call
pub const DEFAULT_MAX_FUNCTION_LOOPS: usize = 5;

/// Default per-call tool timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(180);

/// Default size of the blocking worker pool
pub const DEFAULT_MAX_BLOCKING_WORKERS: usize = 8;

/// Configuration for the tool execution loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Maximum number of tool rounds before the loop gives up
    pub max_function_loops: usize,

    /// Deadline for a single tool call
    pub tool_timeout: Duration,

    /// Blocking tool bodies allowed to run at once
    pub max_blocking_workers: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_function_loops: DEFAULT_MAX_FUNCTION_LOOPS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_blocking_workers: DEFAULT_MAX_BLOCKING_WORKERS,
        }
    }
}

impl LoopConfig {
    /// Set the round limit
    pub fn with_max_function_loops(mut self, max: usize) -> Self {
        self.max_function_loops = max;
        self
    }

    /// Set the per-call timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the blocking worker limit
    pub fn with_max_blocking_workers(mut self, workers: usize) -> Self {
        self.max_blocking_workers = workers;
        self
    }
}

/// Final response of a loop run
#[derive(Debug, Clone)]
pub struct LoopOutcome<R> {
    /// Last response received from the model
    pub response: R,

    /// Number of rounds in which tools were executed
    ///
    /// Equal to `max_function_loops` when the limit cut the loop short, in
    /// which case `response` may still carry unanswered tool calls.
    pub tool_rounds: usize,
}

/// Runs model-requested tool calls until the model stops asking for them
pub struct ToolExecutionLoop {
    registry: Arc<ToolRegistry>,
    config: LoopConfig,
    workers: Arc<Semaphore>,
}

impl ToolExecutionLoop {
    /// Create a loop over `registry`
    pub fn new(registry: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_blocking_workers.max(1)));
        Self {
            registry,
            config,
            workers,
        }
    }

    /// Loop configuration
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Registry the loop resolves tool names against
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Drive `adapter` from `initial` until a response has no tool calls or
    /// the round limit is reached
    ///
    /// Every model turn, including the last, is recorded on the adapter.
    pub async fn run<A: ToolAdapter>(
        &self,
        initial: A::Response,
        adapter: &mut A,
    ) -> genllm_llm::Result<LoopOutcome<A::Response>> {
        let max_rounds = self.config.max_function_loops;
        let mut response = initial;

        for round in 1..=max_rounds {
            let calls = adapter.extract_tool_calls(&response);
            adapter.record_model_turn(&response);
            if calls.is_empty() {
                debug!(round, "Model response has no tool calls");
                return Ok(LoopOutcome {
                    response,
                    tool_rounds: round - 1,
                });
            }

            info!(round, max_rounds, tool_count = calls.len(), "Executing tool round");
            let results = self.execute_round(round, &calls).await;
            let messages = results
                .iter()
                .map(|result| adapter.build_result_message(result))
                .collect();
            response = adapter.send_results(messages).await?;
        }

        let pending = adapter.extract_tool_calls(&response).len();
        adapter.record_model_turn(&response);
        if pending > 0 {
            warn!(
                max_rounds,
                pending_tool_calls = pending,
                "Tool round limit reached, returning last response"
            );
        }
        Ok(LoopOutcome {
            response,
            tool_rounds: max_rounds,
        })
    }

    /// Execute one round of calls concurrently
    ///
    /// Results come back in request order, whatever order the calls finish in.
    pub async fn execute_round(&self, round: usize, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        join_all(calls.iter().map(|call| self.execute_call(round, call))).await
    }

    async fn execute_call(&self, round: usize, request: &ToolCallRequest) -> ToolCallResult {
        info!(
            tool_name = %request.name,
            call_id = %request.call_id,
            round,
            "Executing tool"
        );
        let start = Instant::now();
        let outcome = self.dispatch(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                info!(
                    tool_name = %request.name,
                    call_id = %request.call_id,
                    round,
                    duration_ms,
                    "Tool execution succeeded"
                );
                ToolCallResult::success(request, value)
            }
            Err(err) => {
                match &err {
                    ToolError::Execution(detail) => error!(
                        tool_name = %request.name,
                        call_id = %request.call_id,
                        round,
                        duration_ms,
                        error = %detail,
                        "Tool execution failed"
                    ),
                    other => warn!(
                        tool_name = %request.name,
                        call_id = %request.call_id,
                        round,
                        duration_ms,
                        error = %other,
                        "Tool call rejected"
                    ),
                }
                ToolCallResult::failure(request, &err)
            }
        }
    }

    async fn dispatch(&self, request: &ToolCallRequest) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(&request.name)
            .ok_or_else(|| ToolError::NotFound(request.name.clone()))?;

        let args = request
            .arguments
            .normalize()
            .and_then(|args| tool.prepare_arguments(args))
            .map_err(ToolError::InvalidArguments)?;

        let limit = self.config.tool_timeout;
        tokio::time::timeout(limit, self.invoke(tool.handler(), args))
            .await
            .unwrap_or(Err(ToolError::Timeout(limit)))
    }

    async fn invoke(&self, handler: &ToolHandler, args: Arguments) -> Result<Value, ToolError> {
        match handler {
            ToolHandler::Async(body) => {
                let outcome = AssertUnwindSafe(async move { body(args).await }).catch_unwind().await;
                match outcome {
                    Ok(result) => result.map_err(|e| ToolError::Execution(format!("{e:#}"))),
                    Err(panic) => Err(ToolError::Execution(panic_message(panic.as_ref()))),
                }
            }
            ToolHandler::Blocking(body) => {
                let permit = Arc::clone(&self.workers)
                    .acquire_owned()
                    .await
                    .map_err(|e| ToolError::Execution(e.to_string()))?;
                let body = Arc::clone(body);
                let handle = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    body(args)
                });
                match handle.await {
                    Ok(result) => result.map_err(|e| ToolError::Execution(format!("{e:#}"))),
                    Err(join) if join.is_panic() => {
                        Err(ToolError::Execution(panic_message(join.into_panic().as_ref())))
                    }
                    Err(join) => Err(ToolError::Execution(join.to_string())),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("tool panicked: {detail}")
}
