//! Host introspection.
//!
//! Produces the read-only [`HostContext`] snapshot injected into the model's
//! instructions and printed by `hex info`.

use hex_core::host::HostContext;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const SUDO_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture the host snapshot. Never fails; unknown values are left empty.
pub async fn detect() -> HostContext {
    let host = HostContext {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: detect_hostname().await,
        cpu_cores: std::thread::available_parallelism().ok().map(|n| n.get()),
        memory_gb: read_meminfo(Path::new("/proc/meminfo")),
        sudo: probe_sudo().await,
    };
    debug!(?host, "Detected host context");
    host
}

async fn detect_hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    if let Ok(output) = Command::new("hostname").stdin(Stdio::null()).output().await {
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !name.is_empty() {
            return name;
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into())
}

/// Total memory in GiB, rounded to one decimal.
fn read_meminfo(path: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_meminfo(&content)
}

fn parse_meminfo(content: &str) -> Option<f64> {
    let line = content.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some((kib / 1024.0 / 1024.0 * 10.0).round() / 10.0)
}

/// Whether `sudo` works without a password prompt.
async fn probe_sudo() -> bool {
    let probe = Command::new("sudo")
        .args(["-n", "true"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    match tokio::time::timeout(SUDO_PROBE_TIMEOUT, probe).await {
        Ok(Ok(status)) => status.success(),
        _ => false,
    }
}
