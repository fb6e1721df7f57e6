pub mod file_ops;
pub mod host_info;
pub mod run_command;

use hex_core::config::AppConfig;
use hex_core::tool_registry::ToolRegistry;
use std::sync::Arc;

/// Register all built-in tools into the registry.
pub fn register_all(registry: &mut ToolRegistry, config: &AppConfig) {
    registry.register(Arc::new(run_command::RunCommandTool::new(&config.tools)));
    registry.register(Arc::new(file_ops::ReadFileTool));
    registry.register(Arc::new(file_ops::WriteFileTool));
}

/// A registry with the built-in tools and the configured output limit.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_max_output_chars(config.tools.max_output_chars);
    register_all(&mut registry, config);
    registry
}
