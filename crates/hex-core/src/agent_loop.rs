use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::tool_registry::ToolRegistry;
use crate::transport::Transport;
use crate::types::{AgentEvent, Message};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Maximum number of tool rounds per user turn before the turn is ended.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 20;

/// Summary of one completed user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// All assistant text from the turn, in order.
    pub text: String,
    pub transport_calls: usize,
    pub tool_calls: usize,
    pub hit_iteration_limit: bool,
}

/// The core agent loop: owns the conversation history, calls the transport,
/// and dispatches requested tools until a reply requests none.
///
/// Strictly sequential: one transport call or one tool execution at a time,
/// tools run in the order they were requested.
pub struct AgentLoop {
    transport: Box<dyn Transport>,
    tool_registry: Arc<ToolRegistry>,
    system_prompt: String,
    history: Vec<Message>,
    max_tool_iterations: usize,
    max_history: usize,
}

impl AgentLoop {
    pub fn new(
        transport: Box<dyn Transport>,
        tool_registry: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tool_registry,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_history: 0,
        }
    }

    /// Apply iteration and history limits from config.
    pub fn with_limits(mut self, config: &AgentConfig) -> Self {
        self.max_tool_iterations = config.max_tool_iterations.max(1);
        self.max_history = config.max_history;
        self
    }

    /// The full, append-only conversation history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// False when the transport is text-only and every turn is one call.
    pub fn supports_tools(&self) -> bool {
        self.transport.supports_tools()
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    /// Run one user turn to completion.
    ///
    /// A transport error aborts the turn and is returned to the caller; tool
    /// failures never do, they come back to the model as text.
    pub async fn run_turn(
        &mut self,
        input: &str,
        event_tx: &mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<TurnOutcome, AgentError> {
        self.history.push(Message::user(input));

        let mut text_parts: Vec<String> = Vec::new();
        let mut transport_calls = 0;
        let mut tool_calls = 0;
        let mut iteration = 0;
        let mut hit_iteration_limit = false;

        loop {
            debug!(
                transport = self.transport.name(),
                iteration,
                history = self.history.len(),
                "Agent loop calling transport"
            );

            let reply = self
                .transport
                .send(&self.system_prompt, self.context_window())
                .await?;
            transport_calls += 1;

            let text = reply.text();
            if !text.is_empty() {
                let _ = event_tx.send(AgentEvent::Text(text.clone()));
                text_parts.push(text);
            }

            let requests = reply.tool_requests();
            self.history.push(reply);

            if requests.is_empty() {
                break;
            }

            iteration += 1;
            let mut results = Vec::with_capacity(requests.len());
            for invocation in &requests {
                let _ = event_tx.send(AgentEvent::ToolCallStart {
                    id: invocation.id.clone(),
                    name: invocation.name.clone(),
                });

                let output = self.tool_registry.execute(invocation).await;
                tool_calls += 1;

                let _ = event_tx.send(AgentEvent::ToolResult(output.clone()));
                results.push(output.into_block());
            }
            self.history.push(Message::tool_results(results));

            if iteration >= self.max_tool_iterations {
                warn!(
                    "Hit max tool iterations ({}), ending turn",
                    self.max_tool_iterations
                );
                let notice = format!(
                    "[Agent reached maximum tool iterations ({})]",
                    self.max_tool_iterations
                );
                let _ = event_tx.send(AgentEvent::Text(notice.clone()));
                text_parts.push(notice.clone());
                self.history.push(Message::assistant(notice));
                hit_iteration_limit = true;
                break;
            }
        }

        if let Some(last) = self.history.last() {
            let _ = event_tx.send(AgentEvent::Done(last.clone()));
        }

        Ok(TurnOutcome {
            text: text_parts.join("\n"),
            transport_calls,
            tool_calls,
            hit_iteration_limit,
        })
    }

    /// Trailing slice of history sent to the transport.
    ///
    /// Starts at an operator-typed user message so that no tool result is
    /// ever sent without the request it answers.
    fn context_window(&self) -> &[Message] {
        if self.max_history == 0 || self.history.len() <= self.max_history {
            return &self.history;
        }
        let earliest = self.history.len() - self.max_history;
        let start = (earliest..self.history.len())
            .find(|&i| self.history[i].is_user_text())
            .or_else(|| self.history.iter().rposition(Message::is_user_text))
            .unwrap_or(0);
        &self.history[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::{ParamSpec, ParamType, Tool};
    use crate::types::{ContentBlock, MessageContent, Role};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<Message, AgentError>>>,
        calls: Arc<Mutex<Vec<Vec<Message>>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supports_tools(&self) -> bool {
            true
        }

        async fn send(&self, _system_prompt: &str, history: &[Message]) -> Result<Message, AgentError> {
            self.calls.lock().unwrap().push(history.to_vec());
            self.log.lock().unwrap().push("transport".into());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::assistant("(script exhausted)")))
        }
    }

    /// Stands in for `run_command`; records each command.
    struct FakeShell {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for FakeShell {
        fn name(&self) -> &str {
            "run_command"
        }

        fn description(&self) -> &str {
            "Run a command"
        }

        fn params(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("command", ParamType::String, "Command")]
        }

        async fn execute(&self, args: Value) -> Result<String, AgentError> {
            let command = args["command"].as_str().unwrap_or_default().to_string();
            self.log.lock().unwrap().push(format!("tool:{}", command));
            match command.as_str() {
                "ls /tmp" => Ok("a.txt\nb.txt".into()),
                "big" => Ok("y".repeat(20_000)),
                _ => Ok(format!("ran {}", command)),
            }
        }
    }

    struct Harness {
        agent: AgentLoop,
        calls: Arc<Mutex<Vec<Vec<Message>>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn harness(replies: Vec<Result<Message, AgentError>>, config: AgentConfig) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            replies: Mutex::new(replies.into()),
            calls: calls.clone(),
            log: log.clone(),
        };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FakeShell { log: log.clone() }));
        let agent = AgentLoop::new(Box::new(transport), Arc::new(registry), "SYS").with_limits(&config);
        Harness { agent, calls, log }
    }

    fn tool_use(id: &str, command: &str) -> ContentBlock {
        let mut input = Map::new();
        input.insert("command".into(), json!(command));
        ContentBlock::tool_request(id, "run_command", input)
    }

    fn unbounded() -> AgentConfig {
        AgentConfig {
            max_history: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_text_reply_is_single_transport_call() {
        let mut h = harness(vec![Ok(Message::assistant("hello"))], unbounded());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = h.agent.run_turn("hi", &tx).await.unwrap();

        assert_eq!(outcome.transport_calls, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.text, "hello");
        assert_eq!(h.agent.history().len(), 2);
        assert_eq!(h.agent.history()[1].role, Role::Assistant);
        assert!(matches!(rx.recv().await, Some(AgentEvent::Text(t)) if t == "hello"));
        assert!(matches!(rx.recv().await, Some(AgentEvent::Done(_))));
    }

    #[tokio::test]
    async fn test_list_files_scenario() {
        let mut h = harness(
            vec![
                Ok(Message::assistant_blocks(vec![tool_use("toolu_1", "ls /tmp")])),
                Ok(Message::assistant("There are two files: a.txt and b.txt.")),
            ],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = h.agent.run_turn("list files in /tmp", &tx).await.unwrap();

        assert_eq!(outcome.transport_calls, 2);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.text, "There are two files: a.txt and b.txt.");

        let history = h.agent.history();
        assert_eq!(history.len(), 4);
        match &history[2].content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(
                    blocks[0],
                    ContentBlock::ToolResult {
                        tool_request_id: "toolu_1".into(),
                        text: "a.txt\nb.txt".into(),
                        truncated: false,
                    }
                );
            }
            other => panic!("expected tool result blocks, got {other:?}"),
        }
        assert_eq!(history[2].role, Role::User);

        // The second call saw the tool result.
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls[1].len(), 3);
    }

    #[tokio::test]
    async fn test_tools_run_in_request_order_before_next_call() {
        let mut h = harness(
            vec![
                Ok(Message::assistant_blocks(vec![
                    ContentBlock::text("Running three things."),
                    tool_use("t1", "first"),
                    tool_use("t2", "second"),
                    tool_use("t3", "third"),
                ])),
                Ok(Message::assistant("done")),
            ],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = h.agent.run_turn("go", &tx).await.unwrap();

        assert_eq!(outcome.tool_calls, 3);
        assert_eq!(
            *h.log.lock().unwrap(),
            vec!["transport", "tool:first", "tool:second", "tool:third", "transport"]
        );

        let ids: Vec<String> = match &h.agent.history()[2].content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { tool_request_id, .. } => Some(tool_request_id.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(outcome.text, "Running three things.\ndone");
    }

    #[tokio::test]
    async fn test_large_tool_output_truncated_in_history() {
        let mut h = harness(
            vec![
                Ok(Message::assistant_blocks(vec![tool_use("t1", "big")])),
                Ok(Message::assistant("ok")),
            ],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        h.agent.run_turn("dump", &tx).await.unwrap();

        match &h.agent.history()[2].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { text, truncated, .. } => {
                    assert_eq!(text.chars().count(), 10_000);
                    assert!(truncated);
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_iteration_cap_ends_turn() {
        let replies = (0..10)
            .map(|i| Ok(Message::assistant_blocks(vec![tool_use(&format!("t{i}"), "again")])))
            .collect();
        let config = AgentConfig {
            max_tool_iterations: 3,
            max_history: 0,
            ..Default::default()
        };
        let mut h = harness(replies, config);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = h.agent.run_turn("loop forever", &tx).await.unwrap();

        assert!(outcome.hit_iteration_limit);
        assert_eq!(outcome.transport_calls, 3);
        assert_eq!(outcome.tool_calls, 3);
        let last = h.agent.history().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.text().contains("maximum tool iterations"));
    }

    #[tokio::test]
    async fn test_transport_error_aborts_turn() {
        let mut h = harness(
            vec![Err(AgentError::Transport {
                status: 400,
                body: "bad request".into(),
            })],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = h.agent.run_turn("hi", &tx).await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(h.log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model() {
        let mut h = harness(
            vec![
                Ok(Message::assistant_blocks(vec![ContentBlock::tool_request(
                    "t1",
                    "format_disk",
                    Map::new(),
                )])),
                Ok(Message::assistant("sorry")),
            ],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = h.agent.run_turn("hi", &tx).await.unwrap();
        assert_eq!(outcome.transport_calls, 2);

        match &h.agent.history()[2].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { text, .. } => assert!(text.contains("unknown tool")),
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_context_window_never_orphans_tool_results() {
        let config = AgentConfig {
            max_history: 3,
            ..Default::default()
        };
        let mut h = harness(
            vec![
                Ok(Message::assistant("first answer")),
                Ok(Message::assistant_blocks(vec![tool_use("t1", "one")])),
                Ok(Message::assistant_blocks(vec![tool_use("t2", "two")])),
                Ok(Message::assistant("second answer")),
            ],
            config,
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        h.agent.run_turn("first", &tx).await.unwrap();
        h.agent.run_turn("second", &tx).await.unwrap();

        // History is never trimmed.
        assert_eq!(h.agent.history().len(), 8);

        for sent in h.calls.lock().unwrap().iter() {
            assert!(sent[0].is_user_text(), "window must start at typed input");
        }
        let calls = h.calls.lock().unwrap();
        // Third call of the second turn: the window falls back to the turn's
        // opening message rather than starting mid tool exchange.
        assert_eq!(calls[3].len(), 5);
        assert_eq!(calls[3][0].text(), "second");
    }

    #[tokio::test]
    async fn test_history_alternates_roles() {
        let mut h = harness(
            vec![
                Ok(Message::assistant_blocks(vec![tool_use("t1", "x")])),
                Ok(Message::assistant("done")),
                Ok(Message::assistant("again")),
            ],
            unbounded(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        h.agent.run_turn("one", &tx).await.unwrap();
        h.agent.run_turn("two", &tx).await.unwrap();

        let roles: Vec<Role> = h.agent.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
    }
}
