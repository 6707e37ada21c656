//! Stdio transport MCP client
//!
//! Spawns the server as a child process and speaks newline-delimited
//! JSON-RPC 2.0 over its stdin and stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{MCPClient, MCPServerInfo, MCPToolDefinition, MCPToolResult};
use crate::Result;
use crate::error::MCPError;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// How to launch a stdio MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioServerConfig {
    /// Command to execute
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Pipes of a running server process
struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// MCP client using stdio transport
///
/// Requests are serialized: one request is written and its response read
/// while holding the connection lock, so ids always pair up.
pub struct StdioMCPClient {
    config: StdioServerConfig,
    connection: Mutex<Option<Connection>>,
    server_info: Mutex<Option<MCPServerInfo>>,
    connected: AtomicBool,
    request_id: AtomicU64,
}

impl StdioMCPClient {
    /// Create a client for `command args...`
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(StdioServerConfig {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            cwd: None,
        })
    }

    /// Create from a server config
    pub fn from_config(config: StdioServerConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(MCPError::ConfigError("MCP server command is empty".to_string()));
        }
        Ok(Self::with_config(config))
    }

    fn with_config(config: StdioServerConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            server_info: Mutex::new(None),
            connected: AtomicBool::new(false),
            request_id: AtomicU64::new(0),
        }
    }

    /// Set an environment variable for the server process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Set the server's working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(cwd.into());
        self
    }

    /// Launch configuration
    pub fn config(&self) -> &StdioServerConfig {
        &self.config
    }

    /// Send a JSON-RPC request and wait for the response with the same id
    ///
    /// Notifications and unrelated messages read in between are skipped.
    async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(MCPError::NotConnected)?;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        debug!(method, id, "Sending MCP request");
        write_message(&mut connection.stdin, &request).await?;

        loop {
            let mut line = String::new();
            let read = connection
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| MCPError::ConnectionFailed(e.to_string()))?;
            if read == 0 {
                return Err(MCPError::ConnectionFailed("Server closed connection".to_string()));
            }
            if line.trim().is_empty() {
                continue;
            }

            let message: Value = serde_json::from_str(&line)?;
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(method, "Skipping unrelated MCP message");
                continue;
            }

            if let Some(error) = message.get("error") {
                return Err(MCPError::RequestFailed(format!("{method}: {error}")));
            }
            return message
                .get("result")
                .cloned()
                .ok_or_else(|| MCPError::RequestFailed(format!("{method}: no result in response")));
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(MCPError::NotConnected)?;
        let notification = json!({"jsonrpc": "2.0", "method": method});
        write_message(&mut connection.stdin, &notification).await
    }

    async fn initialize(&self) -> Result<MCPServerInfo> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "genllm",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.send_request("initialize", params).await?;

        let field = |value: &Value, default: &str| value.as_str().unwrap_or(default).to_string();
        let server_info = MCPServerInfo {
            name: field(&result["serverInfo"]["name"], "unknown"),
            version: field(&result["serverInfo"]["version"], "unknown"),
            protocol_version: field(&result["protocolVersion"], PROTOCOL_VERSION),
        };

        self.notify("notifications/initialized").await?;
        Ok(server_info)
    }
}

async fn write_message(stdin: &mut ChildStdin, message: &Value) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| MCPError::ConnectionFailed(e.to_string()))?;
    stdin
        .flush()
        .await
        .map_err(|e| MCPError::ConnectionFailed(e.to_string()))
}

#[async_trait]
impl MCPClient for StdioMCPClient {
    #[instrument(skip(self), fields(command = %self.config.command))]
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        debug!(args = ?self.config.args, "Starting MCP server");

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|e| MCPError::ConnectionFailed(format!("Failed to spawn process: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MCPError::ConnectionFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MCPError::ConnectionFailed("Failed to get stdout".to_string()))?;
        *self.connection.lock().await = Some(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });

        match self.initialize().await {
            Ok(server_info) => {
                info!(
                    server = %server_info.name,
                    version = %server_info.version,
                    "Connected to MCP server"
                );
                *self.server_info.lock().await = Some(server_info);
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.disconnect().await?;
                Err(err)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let connection = self.connection.lock().await.take();
        if let Some(Connection { mut child, stdin, .. }) = connection {
            drop(stdin);
            if let Err(e) = child.kill().await {
                debug!(error = %e, "MCP server already exited");
            }
            info!(command = %self.config.command, "Disconnected from MCP server");
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<MCPToolDefinition>> {
        if !self.is_connected() {
            return Err(MCPError::NotConnected);
        }
        let mut result = self.send_request("tools/list", json!({})).await?;
        serde_json::from_value(result["tools"].take())
            .map_err(|e| MCPError::RequestFailed(format!("Failed to parse tools: {e}")))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<MCPToolResult> {
        if !self.is_connected() {
            return Err(MCPError::NotConnected);
        }
        let params = json!({"name": name, "arguments": arguments});
        let result = self.send_request("tools/call", params).await?;
        serde_json::from_value(result)
            .map_err(|e| MCPError::ToolCallFailed(format!("Failed to parse result: {e}")))
    }

    async fn server_info(&self) -> Option<MCPServerInfo> {
        self.server_info.lock().await.clone()
    }
}
