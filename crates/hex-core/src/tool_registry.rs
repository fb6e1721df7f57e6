use crate::error::AgentError;
use crate::types::{ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maximum characters of a single tool result placed into history.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Boolean,
    Integer,
    Number,
}

/// One entry of a tool's input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
        default: Value,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// Declaration of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// `{type: "object", properties: {...}, required: [...]}`
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = json!({
                "type": param.kind,
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `{name, description, input_schema}`
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema(),
        })
    }

    /// Check required parameters and fill in defaults for absent optional ones.
    fn prepare_input(&self, input: &Map<String, Value>) -> Result<Value, String> {
        let mut prepared = input.clone();
        for param in &self.params {
            let present = prepared.get(&param.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }
            if param.required {
                return Err(format!(
                    "missing required parameter `{}` for tool `{}`",
                    param.name, self.name
                ));
            }
            if let Some(default) = &param.default {
                prepared.insert(param.name.clone(), default.clone());
            }
        }
        Ok(Value::Object(prepared))
    }
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool, as the model refers to it.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Input parameters, in declaration order.
    fn params(&self) -> Vec<ParamSpec>;

    /// Execute the tool. Required parameters are present and defaults applied.
    async fn execute(&self, args: Value) -> Result<String, AgentError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            params: self.params(),
        }
    }
}

/// Registry of available tools, and the executor boundary: `execute` always
/// yields text, never an error.
///
/// Built once at startup, then shared read-only.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    max_output_chars: usize,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!("Registered tool: {}", name);
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    /// Registered tool names, in registration order.
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Specs for all registered tools, in registration order.
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Run one invocation. Failures of any kind come back as `"Error: ..."`
    /// text; the result is cut to the output limit.
    pub async fn execute(&self, invocation: &ToolInvocation) -> ToolOutput {
        debug!(tool = %invocation.name, id = %invocation.id, "Dispatching tool");

        let (content, is_error) = match self.get(&invocation.name) {
            None => (format!("Error: unknown tool: {}", invocation.name), true),
            Some(tool) => match tool.spec().prepare_input(&invocation.input) {
                Err(message) => (format!("Error: {}", message), true),
                Ok(args) => match tool.execute(args).await {
                    Ok(content) => (content, false),
                    Err(e) => (format!("Error: {}", e), true),
                },
            },
        };

        let (content, truncated) = truncate_chars(&content, self.max_output_chars);
        if truncated {
            debug!(tool = %invocation.name, limit = self.max_output_chars, "Tool output truncated");
        }

        ToolOutput {
            tool_request_id: invocation.id.clone(),
            content,
            truncated,
            is_error,
        }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep at most `max` characters, cutting on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    }
}
