//! Command-line interface for genllm
//!
//! # Usage
//!
//! ```bash
//! # OpenAI or any OpenAI-compatible server
//! export OPENAI_API_KEY="sk-..."
//! export OPENAI_API_BASE="http://localhost:1234/v1"   # optional
//! genllm chat --model gpt-4o-mini
//!
//! # Anthropic
//! export ANTHROPIC_API_KEY="sk-ant-..."
//! genllm chat --provider anthropic
//!
//! # Gemini
//! export GEMINI_API_KEY="..."
//! genllm chat --provider gemini
//!
//! # Add the tools of a stdio MCP server
//! genllm chat --mcp-server uvx --mcp-arg mcp-server-time
//! ```

mod conversation;
mod tools;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use genllm_core::ChatAgent;
use genllm_llm::providers::{
    AnthropicConfig, AnthropicVendor, GeminiConfig, GeminiVendor, OpenAIConfig, OpenAIVendor,
};
use genllm_llm::{ChatTransport, Vendor};
use genllm_mcp::{MCPClient, StdioMCPClient};
use genllm_runtime::LlmAgent;
use genllm_tools::ToolRegistry;
use genllm_utils::{Provider, Settings};
use tracing::info;

use crate::conversation::Conversation;

#[derive(Parser, Debug)]
#[command(name = "genllm")]
#[command(about = "Chat with an LLM that can call local tools", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat session
    Chat(ChatArgs),
    /// Ask a single question and exit
    Ask(AskArgs),
    /// Print the tool declarations sent to the model
    Tools,
}

#[derive(clap::Args, Debug, Default)]
struct AgentArgs {
    /// Vendor API: openai or anthropic (default from GENLLM_PROVIDER)
    #[arg(long)]
    provider: Option<Provider>,

    /// Model name (default from GENLLM_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// System instruction
    #[arg(short, long)]
    system: Option<String>,

    /// Maximum tool rounds per turn
    #[arg(long)]
    max_function_loops: Option<usize>,

    /// Per-call tool timeout in seconds
    #[arg(long)]
    tool_timeout: Option<u64>,

    /// Command of a stdio MCP server whose tools are added
    #[arg(long)]
    mcp_server: Option<String>,

    /// Argument for the MCP server command (repeatable)
    #[arg(long = "mcp-arg", requires = "mcp_server", allow_hyphen_values = true)]
    mcp_args: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(clap::Args, Debug)]
struct AskArgs {
    #[command(flatten)]
    agent: AgentArgs,

    /// The question
    prompt: String,
}

impl AgentArgs {
    fn mcp_client(&self) -> Option<StdioMCPClient> {
        self.mcp_server
            .as_ref()
            .map(|command| StdioMCPClient::new(command.clone(), self.mcp_args.clone()))
    }

    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(provider) = self.provider {
            if settings.provider != provider && self.model.is_none() {
                settings.model = provider.default_model().to_string();
            }
            settings.provider = provider;
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(system) = self.system {
            settings.system_prompt = Some(system);
        }
        if let Some(max) = self.max_function_loops {
            settings.max_function_loops = max;
        }
        if let Some(secs) = self.tool_timeout {
            settings.tool_timeout = Duration::from_secs(secs);
        }
        settings
    }
}

fn build_agent<V: Vendor>(
    vendor: V,
    transport: impl ChatTransport + 'static,
    settings: &Settings,
    registry: Arc<ToolRegistry>,
) -> anyhow::Result<LlmAgent<V>> {
    let agent = LlmAgent::builder(vendor)
        .model(settings.model.clone())
        .config(settings.llm_config())
        .max_function_loops(settings.max_function_loops)
        .tool_timeout(settings.tool_timeout)
        .transport(transport)
        .registry(registry)
        .build()?;
    Ok(agent)
}

fn connect(settings: &Settings, registry: Arc<ToolRegistry>) -> anyhow::Result<Box<dyn ChatAgent>> {
    Ok(match settings.provider {
        Provider::OpenAI => {
            let config = OpenAIConfig::from_env()
                .unwrap_or_else(|_| OpenAIConfig::new("not-needed").with_api_base(
                    std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| "http://localhost:1234/v1".to_string()),
                ))
                .with_timeout(180);
            Box::new(build_agent(OpenAIVendor, config.transport()?, settings, registry)?)
        }
        Provider::Anthropic => {
            let config = AnthropicConfig::from_env().context("Anthropic requires ANTHROPIC_API_KEY")?;
            Box::new(build_agent(AnthropicVendor, config.transport()?, settings, registry)?)
        }
        Provider::Gemini => {
            let config = GeminiConfig::from_env().context("Gemini requires GEMINI_API_KEY")?;
            Box::new(build_agent(GeminiVendor, config.transport()?, settings, registry)?)
        }
    })
}

/// Connect to the MCP server and register its tools
async fn attach_mcp(client: StdioMCPClient, registry: &ToolRegistry) -> anyhow::Result<Arc<dyn MCPClient>> {
    let client: Arc<dyn MCPClient> = Arc::new(client);
    client.connect().await.context("Failed to start MCP server")?;
    let loaded = genllm_mcp::load_into(Arc::clone(&client), registry).await?;
    info!(tool_count = loaded.len(), tools = ?loaded, "Loaded MCP tools");
    Ok(client)
}

async fn run_chat(agent: &dyn ChatAgent) -> anyhow::Result<()> {
    println!("Chatting with {} ({}). /reset clears history, /exit quits.\n", agent.model(), agent.vendor());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut conversation = Conversation::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!("\nGoodbye!");
            break;
        }

        let input = input.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" => {
                println!("Goodbye!");
                break;
            }
            "/reset" => {
                conversation.reset();
                println!("History cleared.\n");
                continue;
            }
            _ => {}
        }

        match conversation.send(agent, input).await {
            Ok(reply) => {
                println!("{}\n", reply.text);
                info!(
                    tool_rounds = reply.tool_rounds,
                    total_tokens = reply.usage.total(),
                    history_len = conversation.history().len(),
                    "Turn completed"
                );
            }
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        genllm_utils::init_json_tracing();
    } else {
        genllm_utils::init_tracing_with_filter("warn,genllm_runtime=info");
    }

    let registry = Arc::new(ToolRegistry::new());
    tools::register_demo_tools(&registry)?;

    match cli.command {
        Command::Tools => {
            let declarations = serde_json::Value::Array(registry.declarations());
            println!("{}", serde_json::to_string_pretty(&declarations)?);
        }
        Command::Ask(args) => {
            let mcp = match args.agent.mcp_client() {
                Some(client) => Some(attach_mcp(client, &registry).await?),
                None => None,
            };
            let settings = args.agent.apply(Settings::from_env()?);
            let agent = connect(&settings, registry)?;
            let reply = agent.ask(&args.prompt, None).await?;
            println!("{}", reply.text);
            if let Some(client) = mcp {
                client.disconnect().await?;
            }
        }
        Command::Chat(args) => {
            let mcp = match args.agent.mcp_client() {
                Some(client) => Some(attach_mcp(client, &registry).await?),
                None => None,
            };
            let settings = args.agent.apply(Settings::from_env()?);
            let agent = connect(&settings, registry)?;
            run_chat(agent.as_ref()).await?;
            if let Some(client) = mcp {
                client.disconnect().await?;
            }
        }
    }

    Ok(())
}
