use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One unit of a message's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// An action the model wants performed. `id` is the backend's correlation id.
    ToolRequest {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    /// The executor's answer to the request with the same id.
    ToolResult {
        tool_request_id: String,
        text: String,
        truncated: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_request(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self::ToolRequest {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Plain text or an ordered sequence of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(content.into()))
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, MessageContent::Blocks(blocks))
    }

    /// The `user` message that carries a round of tool results back to the model.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, MessageContent::Blocks(results))
    }

    /// All text in the message, text blocks joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Tool requests in the order the backend emitted them.
    pub fn tool_requests(&self) -> Vec<ToolInvocation> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolRequest { id, name, input } => Some(ToolInvocation {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }

    /// True for a user message typed by the operator (no tool results).
    pub fn is_user_text(&self) -> bool {
        if self.role != Role::User {
            return false;
        }
        match &self.content {
            MessageContent::Text(_) => true,
            MessageContent::Blocks(blocks) => !blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
        }
    }
}

/// A single tool request, created per request and dropped once its result is in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id supplied by the backend, echoed verbatim in the result.
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: match input {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// Output from a tool execution, already bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_request_id: String,
    pub content: String,
    pub truncated: bool,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn into_block(self) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_request_id: self.tool_request_id,
            text: self.content,
            truncated: self.truncated,
        }
    }
}

/// Progress event emitted while a turn runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Text from the assistant.
    Text(String),
    /// A tool is about to run.
    ToolCallStart { id: String, name: String },
    /// Tool execution completed.
    ToolResult(ToolOutput),
    /// The turn is over; carries the final assistant message.
    Done(Message),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_joins_text_blocks_only() {
        let msg = Message::assistant_blocks(vec![
            ContentBlock::text("first"),
            ContentBlock::tool_request("t1", "run_command", Map::new()),
            ContentBlock::text("second"),
        ]);
        assert_eq!(msg.text(), "first\nsecond");
    }

    #[test]
    fn test_tool_requests_preserve_order() {
        let mut input = Map::new();
        input.insert("command".into(), json!("ls"));
        let msg = Message::assistant_blocks(vec![
            ContentBlock::tool_request("b", "read_file", Map::new()),
            ContentBlock::text("between"),
            ContentBlock::tool_request("a", "run_command", input.clone()),
        ]);
        let requests = msg.tool_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id, "b");
        assert_eq!(requests[1].id, "a");
        assert_eq!(requests[1].input, input);
    }

    #[test]
    fn test_is_user_text() {
        assert!(Message::user("hi").is_user_text());
        assert!(!Message::assistant("hi").is_user_text());
        let results = Message::tool_results(vec![ContentBlock::ToolResult {
            tool_request_id: "t1".into(),
            text: "ok".into(),
            truncated: false,
        }]);
        assert!(!results.is_user_text());
    }

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::ToolResult {
            tool_request_id: "t1".into(),
            text: "done".into(),
            truncated: true,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_request_id"], "t1");
        assert_eq!(json["truncated"], true);
    }

    #[test]
    fn test_invocation_from_non_object_input() {
        let inv = ToolInvocation::new("x", "read_file", json!("not an object"));
        assert!(inv.input.is_empty());
    }
}
