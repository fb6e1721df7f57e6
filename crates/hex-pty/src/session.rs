//! Running a command on a pseudo-terminal.
//!
//! Wraps `portable-pty`: the command is attached to the slave side (stdin,
//! stdout and stderr all point at the terminal device) and output is read
//! from the master side until the child hangs up or goes idle.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::time::Duration;

use crate::capture::{self, CaptureEnd};

/// How long to wait for the child to be reaped once its output has ended.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Failed to create PTY: {0}")]
    Creation(String),

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal dimensions and idle window for one run.
#[derive(Debug, Clone, Copy)]
pub struct PtyOptions {
    pub cols: u16,
    pub rows: u16,
    pub idle_timeout: Duration,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            // Wide enough that the child rarely hard-wraps its lines.
            cols: 200,
            rows: 50,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of running a command to completion (or idleness) on a pty.
#[derive(Debug, Clone)]
pub struct PtyOutput {
    /// Permissively decoded output, still containing terminal escapes.
    pub raw: String,
    pub end: CaptureEnd,
    /// Exit code, if the child was reaped.
    pub exit_code: Option<u32>,
}

/// A child process attached to a freshly allocated pty.
pub struct PtyProcess {
    program: String,
    // Held so the terminal stays open until the output has been collected.
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyProcess {
    /// Spawn `program args...` on a new pty in the current directory.
    pub fn spawn(program: &str, args: &[String], options: &PtyOptions) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Creation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(std::env::current_dir()?);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        // Our copy of the slave must close, or the master never sees EOF.
        drop(pair.slave);

        tracing::debug!(
            program = program,
            pid = ?child.process_id(),
            cols = options.cols,
            rows = options.rows,
            "PTY process spawned"
        );

        Ok(Self {
            program: program.to_string(),
            master: pair.master,
            child,
        })
    }

    /// Collect output until EOF or idle timeout, then reap the child.
    ///
    /// On idle timeout the child is killed; whatever was captured so far is
    /// returned rather than treated as an error.
    pub async fn run_to_end(self, idle_timeout: Duration) -> Result<PtyOutput, PtyError> {
        let Self {
            program,
            master,
            mut child,
        } = self;

        let reader = master
            .try_clone_reader()
            .map_err(|e| PtyError::Creation(e.to_string()))?;

        let capture = capture::collect(reader, idle_timeout).await;

        let mut killer = child.clone_killer();
        if capture.end == CaptureEnd::IdleTimeout {
            tracing::warn!(
                program = %program,
                idle_secs = idle_timeout.as_secs(),
                "PTY output idle, killing child"
            );
            let _ = killer.kill();
        }

        let reaped = tokio::time::timeout(
            REAP_TIMEOUT,
            tokio::task::spawn_blocking(move || child.wait()),
        )
        .await;

        let exit_code = match reaped {
            Ok(Ok(Ok(status))) => Some(status.exit_code()),
            Ok(Ok(Err(e))) => {
                tracing::debug!("Failed to reap {}: {}", program, e);
                None
            }
            Ok(Err(e)) => {
                tracing::debug!("Reaper task failed for {}: {}", program, e);
                None
            }
            Err(_) => {
                let _ = killer.kill();
                None
            }
        };

        drop(master);

        tracing::debug!(program = %program, exit_code = ?exit_code, "PTY process finished");

        Ok(PtyOutput {
            raw: capture.text(),
            end: capture.end,
            exit_code,
        })
    }
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("program", &self.program)
            .field("pid", &self.child.process_id())
            .finish()
    }
}

/// Spawn `program args...` on a pty and collect its output.
pub async fn run(program: &str, args: &[String], options: &PtyOptions) -> Result<PtyOutput, PtyError> {
    let process = PtyProcess::spawn(program, args, options)?;
    process.run_to_end(options.idle_timeout).await
}
