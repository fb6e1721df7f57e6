use hex_core::error::AgentError;
use hex_core::tool_registry::{ParamSpec, ParamType, Tool};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand a leading `~` to the home directory. Other paths pass through.
pub fn resolve_path(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

// ── read_file ──────────────────────────────────────────────────────────

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns the file's text content. \
         Use this to inspect source code, configuration files, logs, etc."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "path",
            ParamType::String,
            "Path to the file to read; `~` expands to the home directory",
        )]
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }
        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool("read_file", format!("Invalid arguments: {}", e)))?;

        let path = resolve_path(&args.path);
        debug!("Reading file: {}", path.display());
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            AgentError::tool("read_file", format!("Failed to read '{}': {}", path.display(), e))
        })
    }
}

// ── write_file ─────────────────────────────────────────────────────────

pub struct WriteFileTool;

impl WriteFileTool {
    async fn write(path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. \
         Overwrites the file if it already exists."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required(
                "path",
                ParamType::String,
                "Path to the file to write; `~` expands to the home directory",
            ),
            ParamSpec::required("content", ParamType::String, "The content to write"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            path: String,
            content: String,
        }
        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool("write_file", format!("Invalid arguments: {}", e)))?;

        let path = resolve_path(&args.path);
        debug!("Writing {} bytes to {}", args.content.len(), path.display());
        Self::write(&path, &args.content).await.map_err(|e| {
            AgentError::tool("write_file", format!("Failed to write '{}': {}", path.display(), e))
        })?;

        Ok(format!("Wrote {} bytes to {}", args.content.len(), path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_core::tool_registry::ToolRegistry;
    use hex_core::types::ToolInvocation;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Serializes tests that read or repoint `HOME`.
    static HOME_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry
    }

    #[test]
    fn test_resolve_home_shorthand() {
        let _guard = HOME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(resolve_path("~/test.txt"), home.join("test.txt"));
        assert_eq!(resolve_path("~"), home);
        assert_eq!(resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(resolve_path("rel/~/x"), PathBuf::from("rel/~/x"));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/note.txt");
        let path_str = path.to_str().unwrap();
        let content = "line one\nline two, ünïcode\n";

        let written = WriteFileTool
            .execute(json!({"path": path_str, "content": content}))
            .await
            .unwrap();
        assert_eq!(
            written,
            format!("Wrote {} bytes to {}", content.len(), path.display())
        );

        let read = ReadFileTool.execute(json!({"path": path_str})).await.unwrap();
        assert_eq!(read, content);
    }

    #[tokio::test]
    async fn test_write_to_home_relative_path() {
        let _guard = HOME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let home = TempDir::new().unwrap();
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", home.path());

        let written = WriteFileTool
            .execute(json!({"path": "~/test.txt", "content": "hello"}))
            .await;
        let read = ReadFileTool.execute(json!({"path": "~/test.txt"})).await;

        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }

        let expected = home.path().join("test.txt");
        assert_eq!(
            written.unwrap(),
            format!("Wrote 5 bytes to {}", expected.display())
        );
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "hello");
        assert_eq!(read.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, "old contents that are longer").unwrap();

        let out = WriteFileTool
            .execute(json!({"path": path.to_str().unwrap(), "content": "hello"}))
            .await
            .unwrap();
        assert!(out.starts_with("Wrote 5 bytes to "));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error_text() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.txt");
        let invocation = ToolInvocation::new(
            "t1",
            "read_file",
            json!({"path": missing.to_str().unwrap()}),
        );

        let output = registry().execute(&invocation).await;
        assert!(output.is_error);
        assert!(output.content.contains("Error"), "got: {}", output.content);
    }

    #[tokio::test]
    async fn test_missing_path_argument_is_error_text() {
        let registry = registry();
        for name in ["read_file", "write_file"] {
            let invocation = ToolInvocation::new("t1", name, json!({"content": "x"}));
            let output = registry.execute(&invocation).await;
            assert!(output.content.contains("Error"), "got: {}", output.content);
            assert!(output.content.contains("path"), "got: {}", output.content);
        }
    }

    #[tokio::test]
    async fn test_read_non_utf8_is_error_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bin.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let invocation = ToolInvocation::new("t1", "read_file", json!({"path": path.to_str().unwrap()}));
        let output = registry().execute(&invocation).await;
        assert!(output.content.starts_with("Error"), "got: {}", output.content);
    }
}
