use serde::{Deserialize, Serialize};

/// Read-only snapshot of the machine, captured once at startup and injected
/// into the model's instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostContext {
    pub os: String,
    pub arch: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    pub sudo: bool,
}

impl HostContext {
    /// One-line description, e.g. `[System: linux x86_64, 8 cores, 15.5GB RAM, sudo=no]`.
    pub fn summary(&self) -> String {
        let cores = self
            .cpu_cores
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".into());
        let memory = self
            .memory_gb
            .map(|m| m.to_string())
            .unwrap_or_else(|| "?".into());
        format!(
            "[System: {} {}, {} cores, {}GB RAM, sudo={}]",
            self.os,
            self.arch,
            cores,
            memory,
            if self.sudo { "yes" } else { "no" }
        )
    }
}
