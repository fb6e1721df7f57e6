//! Transport that drives a model CLI on a pseudo-terminal.
//!
//! The CLI has no structured tool protocol, so the conversation is flattened
//! into one text prompt and the reply is plain text. The agent loop therefore
//! makes exactly one call per user turn with this transport.

use async_trait::async_trait;
use hex_pty::{CaptureEnd, PtyOptions, TerminalSanitizer};
use tracing::{debug, warn};

use crate::config::{AgentConfig, ProviderConfig};
use crate::error::AgentError;
use crate::prompt;
use crate::transport::{Transport, NO_RESPONSE};
use crate::types::Message;

pub struct PtyTransport {
    program: String,
    args: Vec<String>,
    options: PtyOptions,
    window: usize,
    excerpt_chars: usize,
    sanitizer: TerminalSanitizer,
}

impl PtyTransport {
    pub fn new(provider: &ProviderConfig, agent: &AgentConfig) -> Self {
        Self {
            program: provider.cli_program.clone(),
            args: provider.cli_args.clone(),
            options: PtyOptions {
                idle_timeout: provider.idle_timeout(),
                ..Default::default()
            },
            window: agent.prompt_window,
            excerpt_chars: agent.reply_excerpt_chars,
            sanitizer: TerminalSanitizer::new(),
        }
    }

    /// Arguments for one invocation: configured flags, then the prompt.
    fn command_args(&self, prompt: String) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(prompt);
        args
    }
}

#[async_trait]
impl Transport for PtyTransport {
    fn name(&self) -> &str {
        "pty"
    }

    fn supports_tools(&self) -> bool {
        false
    }

    async fn send(&self, system_prompt: &str, history: &[Message]) -> Result<Message, AgentError> {
        let prompt = prompt::flatten(system_prompt, history, self.window, self.excerpt_chars);
        debug!(program = %self.program, prompt_chars = prompt.chars().count(), "Invoking model CLI");

        let output = hex_pty::run(&self.program, &self.command_args(prompt), &self.options).await?;
        if output.end == CaptureEnd::IdleTimeout {
            warn!(
                idle_secs = self.options.idle_timeout.as_secs(),
                "Model CLI went idle; using partial output"
            );
        }

        let text = self.sanitizer.clean(&output.raw);
        if text.is_empty() {
            if let Some(code) = output.exit_code.filter(|&c| c != 0) {
                return Err(AgentError::Provider(format!(
                    "{} exited with status {} and no output",
                    self.program, code
                )));
            }
            return Ok(Message::assistant(NO_RESPONSE));
        }
        Ok(Message::assistant(text))
    }
}
