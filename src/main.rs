mod repl;

use hex_core::config::{AppConfig, Backend};
use hex_core::credentials::Credentials;
use hex_core::host::HostContext;
use hex_core::http_transport::HttpTransport;
use hex_core::pty_transport::PtyTransport;
use hex_core::transport::Transport;
use hex_core::types::AgentEvent;
use hex_core::{prompt, AgentLoop};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hex",
    about = "An AI agent with full control of this machine",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/hex/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Override the backend: `cli` (model CLI on a pty) or `http`
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat,

    /// Print host information as JSON
    Info,

    /// Run a single prompt and print the reply
    Run {
        /// The prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only conversation text.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "hex=warn".into()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(backend) = cli.backend {
        config.provider.backend = backend;
    }

    match cli.command {
        Some(Commands::Config { action }) => handle_config_command(action, &config),
        Some(Commands::Info) => {
            let host = hex_tools::host_info::detect().await;
            println!("{}", serde_json::to_string_pretty(&host)?);
            Ok(())
        }
        Some(Commands::Run { prompt }) => {
            let host = hex_tools::host_info::detect().await;
            let mut agent = build_agent(&config, &host).await;
            run_once(&mut agent, &prompt.join(" ")).await
        }
        Some(Commands::Chat) | None => {
            let host = hex_tools::host_info::detect().await;
            let agent = build_agent(&config, &host).await;
            repl::run(agent, &host).await
        }
    }
}

/// Build the tool registry, transport, and agent loop. Setup failures are
/// fatal: print a message and exit 1 without entering the loop.
async fn build_agent(config: &AppConfig, host: &HostContext) -> AgentLoop {
    let registry = Arc::new(hex_tools::default_registry(config));

    let transport: Box<dyn Transport> = match config.provider.backend {
        Backend::Cli => {
            if !cli_available(&config.provider.cli_program).await {
                eprintln!(
                    "Error: CLI not found: `{}`. Install: npm install -g @anthropic-ai/claude-code",
                    config.provider.cli_program
                );
                std::process::exit(1);
            }
            Box::new(PtyTransport::new(&config.provider, &config.agent))
        }
        Backend::Http => {
            let credentials = Credentials::resolve(&config.provider).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            let transport = HttpTransport::new(&config.provider, credentials, &registry.list_specs())
                .unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                });
            Box::new(transport)
        }
    };

    tracing::info!(
        "Loaded {} tools, backend: {}, model: {}",
        registry.len(),
        transport.name(),
        config.provider.model,
    );

    let system_prompt = prompt::system_prompt(&config.system_prompt, host);
    AgentLoop::new(transport, registry, system_prompt).with_limits(&config.agent)
}

/// `<program> --version` exits successfully.
async fn cli_available(program: &str) -> bool {
    tokio::process::Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// One turn, reply on stdout.
async fn run_once(agent: &mut AgentLoop, input: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AgentEvent>();
    let outcome = agent.run_turn(input, &tx).await?;
    drop(tx);
    while let Ok(event) = rx.try_recv() {
        if let AgentEvent::ToolCallStart { name, .. } = event {
            tracing::info!("Ran tool: {}", name);
        }
    }
    println!("{}", hex_pty::sanitize(&outcome.text));
    Ok(())
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
