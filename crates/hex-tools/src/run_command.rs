use hex_core::config::ToolsConfig;
use hex_core::error::AgentError;
use hex_core::tool_registry::{ParamSpec, ParamType, Tool};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Result text for a command that printed nothing and exited cleanly.
pub const NO_OUTPUT: &str = "(no output)";

/// Run shell commands on the host.
pub struct RunCommandTool {
    shell: String,
    sudo: String,
    timeout: Duration,
}

impl RunCommandTool {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            sudo: "sudo".into(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// The program actually spawned for this invocation.
    fn program(&self, sudo: bool) -> &str {
        if sudo {
            &self.sudo
        } else {
            &self.shell
        }
    }

    fn command(&self, command: &str, sudo: bool) -> Command {
        let mut cmd = Command::new(self.program(sudo));
        if sudo {
            // Non-interactive: fails fast instead of prompting for a password.
            cmd.arg("-n").arg(&self.shell);
        }
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down everything the shell started.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Run to completion or until the timeout. Never errors: spawn failures
    /// and timeouts come back as text for the model.
    pub async fn run(&self, command: &str, sudo: bool) -> String {
        debug!(sudo, "Executing shell command: {}", command);

        let mut child = match self.command(command, sudo).spawn() {
            Ok(child) => child,
            Err(e) => return format!("Error: failed to start {}: {}", self.program(sudo), e),
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Pipes are read under the same deadline: a background job holding
        // them open counts against the timeout.
        let finished = tokio::time::timeout(self.timeout, async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            status.map(|status| (status, stdout, stderr))
        })
        .await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => ExecResult {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code().unwrap_or(-1),
            }
            .to_display_string(),
            Ok(Err(e)) => format!("Error: {}", e),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Command timed out: {}", command);
                terminate(&mut child).await;
                format!("Error: command timed out after {}s", self.timeout.as_secs())
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Reading command output failed: {}", e);
        }
    }
    buf
}

/// Kill the command's whole process group, then reap the shell.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, "killpg failed: {}", e);
            }
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("Kill failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        debug!("Reaping timed-out command failed: {}", e);
    }
}

/// Captured output of one command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// Format as a human-readable string for the model.
    pub fn to_display_string(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(&self.stderr);
        }
        if self.exit_code != 0 {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("[exit code: {}]", self.exit_code));
        }
        if text.trim().is_empty() {
            return NO_OUTPUT.to_string();
        }
        text
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command on this machine and return its output. \
         Use this to inspect the system, install packages, manage files and processes."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("command", ParamType::String, "The shell command to execute"),
            ParamSpec::optional(
                "sudo",
                ParamType::Boolean,
                "Run the command with sudo",
                Value::Bool(false),
            ),
        ]
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        #[derive(Deserialize)]
        struct Args {
            command: String,
            #[serde(default)]
            sudo: bool,
        }
        let args: Args = serde_json::from_value(args)
            .map_err(|e| AgentError::tool("run_command", format!("Invalid arguments: {}", e)))?;

        Ok(self.run(&args.command, args.sudo).await)
    }
}
