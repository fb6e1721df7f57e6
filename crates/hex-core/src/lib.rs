pub mod agent_loop;
pub mod config;
pub mod credentials;
pub mod error;
pub mod host;
pub mod http_transport;
pub mod prompt;
pub mod pty_transport;
pub mod tool_registry;
pub mod transport;
pub mod types;

pub use agent_loop::{AgentLoop, TurnOutcome};
pub use config::{AgentConfig, AppConfig, Backend, ProviderConfig, ToolsConfig};
pub use credentials::Credentials;
pub use error::AgentError;
pub use host::HostContext;
pub use http_transport::HttpTransport;
pub use pty_transport::PtyTransport;
pub use tool_registry::{ParamSpec, ParamType, Tool, ToolRegistry, ToolSpec};
pub use transport::Transport;
pub use types::{AgentEvent, ContentBlock, Message, MessageContent, Role, ToolInvocation, ToolOutput};
