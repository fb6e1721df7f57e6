use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::Message;

/// Reply text used when the backend produced nothing usable.
pub const NO_RESPONSE: &str = "(no response)";

/// Turns conversation state into a single model reply, whatever the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether replies can carry tool requests. A transport that returns
    /// plain text only makes every user turn a single call.
    fn supports_tools(&self) -> bool;

    /// Send the system prompt and history; returns the assistant's reply.
    async fn send(&self, system_prompt: &str, history: &[Message]) -> Result<Message, AgentError>;
}
