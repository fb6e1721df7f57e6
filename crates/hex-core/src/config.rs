use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AgentError;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub tools: ToolsConfig,
    pub agent: AgentConfig,
    pub system_prompt: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            tools: ToolsConfig::default(),
            agent: AgentConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.config/hex/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hex")
            .join("config.toml")
    }
}

/// Which transport strategy talks to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Drive the model CLI on a pseudo-terminal.
    Cli,
    /// Call the messages endpoint over HTTP.
    Http,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cli" | "pty" => Ok(Self::Cli),
            "http" | "api" => Ok(Self::Http),
            other => Err(format!("unknown backend '{}' (expected 'cli' or 'http')", other)),
        }
    }
}

/// Model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: Backend,
    /// Base URL of the messages API.
    pub api_base: String,
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Inline bearer token; takes precedence over the credential file.
    pub api_key: Option<String>,
    /// Credential file location (default ~/.claude/.credentials.json).
    pub credentials_path: Option<PathBuf>,
    /// HTTP client timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for 429/5xx/network failures before giving up.
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub retry_backoff_ms: u64,
    /// Model CLI executable for the cli backend.
    pub cli_program: String,
    /// Flags passed before the prompt.
    pub cli_args: Vec<String>,
    /// Seconds without output before the CLI's reply is considered complete.
    pub idle_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cli,
            api_base: "https://api.anthropic.com".into(),
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 4096,
            api_version: "2023-06-01".into(),
            api_key: None,
            credentials_path: None,
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 1000,
            cli_program: "claude".into(),
            cli_args: vec!["-p".into(), "--dangerously-skip-permissions".into()],
            idle_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Built-in tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Shell used by `run_command` (invoked as `<shell> -c <command>`).
    pub shell: String,
    /// Wall-clock limit for a single command.
    pub command_timeout_secs: u64,
    /// Characters of a tool result kept in history.
    pub max_output_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: "sh".into(),
            command_timeout_secs: 60,
            max_output_chars: crate::tool_registry::DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Tool rounds allowed per user turn.
    pub max_tool_iterations: usize,
    /// Messages sent per HTTP call (0 = whole history).
    pub max_history: usize,
    /// Prior messages flattened into the CLI prompt.
    pub prompt_window: usize,
    /// Characters kept from each prior assistant reply in the CLI prompt.
    pub reply_excerpt_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: crate::agent_loop::DEFAULT_MAX_TOOL_ITERATIONS,
            max_history: 100,
            prompt_window: 4,
            reply_excerpt_chars: 300,
        }
    }
}
