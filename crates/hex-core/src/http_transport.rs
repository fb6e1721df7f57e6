//! Request/response transport against a messages endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::credentials::Credentials;
use crate::error::AgentError;
use crate::tool_registry::ToolSpec;
use crate::transport::{Transport, NO_RESPONSE};
use crate::types::{ContentBlock, Message, MessageContent, Role};

/// Error classification for retry decisions.
#[derive(Debug, Clone)]
pub enum RequestError {
    /// Safe to retry: 429, 5xx, timeout, connection failure.
    Transient { status: Option<u16>, message: String },
    /// Stop immediately: any other non-success status or an unreadable body.
    Permanent { status: Option<u16>, message: String },
}

impl RequestError {
    fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Transient {
                status: Some(status.as_u16()),
                message: body,
            }
        } else {
            Self::Permanent {
                status: Some(status.as_u16()),
                message: body,
            }
        }
    }

    fn into_agent_error(self) -> AgentError {
        match self {
            Self::Transient { status: Some(status), message }
            | Self::Permanent { status: Some(status), message } => AgentError::Transport {
                status,
                body: message,
            },
            Self::Transient { status: None, message } | Self::Permanent { status: None, message } => {
                AgentError::Provider(message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireReply {
    content: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    #[serde(other)]
    Other,
}

/// Transport that POSTs the whole request to `{api_base}/v1/messages`.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_version: String,
    credentials: Credentials,
    tools: Vec<Value>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpTransport {
    pub fn new(
        config: &ProviderConfig,
        credentials: Credentials,
        tools: &[ToolSpec],
    ) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_version: config.api_version.clone(),
            credentials,
            tools: tools.iter().map(ToolSpec::to_json).collect(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// `{model, max_tokens, system, messages, tools}`
    fn build_body(&self, system_prompt: &str, history: &[Message]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": history.iter().map(message_to_wire).collect::<Vec<_>>(),
        });
        if !self.tools.is_empty() {
            body["tools"] = Value::Array(self.tools.clone());
        }
        body
    }

    async fn post_once(&self, body: &Value) -> Result<WireReply, RequestError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credentials.access_token())
            .header("anthropic-version", &self.api_version)
            .json(body)
            .send()
            .await
            .map_err(|e| RequestError::Transient {
                status: None,
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RequestError::from_status(status, text));
        }

        response
            .json::<WireReply>()
            .await
            .map_err(|e| RequestError::Permanent {
                status: None,
                message: format!("invalid response body: {}", e),
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn send(&self, system_prompt: &str, history: &[Message]) -> Result<Message, AgentError> {
        let body = self.build_body(system_prompt, history);
        let mut attempt = 0u32;

        loop {
            debug!(endpoint = %self.endpoint, messages = history.len(), attempt, "Sending request");
            match self.post_once(&body).await {
                Ok(reply) => return Ok(reply_to_message(reply)),
                Err(RequestError::Transient { status, message }) if attempt < self.max_retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        status = ?status,
                        delay_ms = delay.as_millis() as u64,
                        "Transient backend error, retrying: {}",
                        message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into_agent_error()),
            }
        }
    }
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &message.content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Blocks(blocks) => Value::Array(blocks.iter().map(block_to_wire).collect()),
    };
    json!({ "role": role, "content": content })
}

fn block_to_wire(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        ContentBlock::ToolRequest { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_request_id,
            text,
            ..
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_request_id,
            "content": text,
        }),
    }
}

/// An assistant turn with no content is rejected when sent back as history,
/// so a reply with nothing usable becomes the `NO_RESPONSE` text.
fn reply_to_message(reply: WireReply) -> Message {
    let blocks: Vec<ContentBlock> = reply
        .content
        .into_iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } if text.is_empty() => None,
            WireBlock::Text { text } => Some(ContentBlock::Text { text }),
            WireBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolRequest { id, name, input }),
            WireBlock::Other => {
                debug!("Skipping unsupported content block");
                None
            }
        })
        .collect();
    if blocks.is_empty() {
        debug!("Reply had no usable content");
        return Message::assistant(NO_RESPONSE);
    }
    Message::assistant_blocks(blocks)
}
