//! Bearer credential loading for the HTTP backend.
//!
//! The token comes from `provider.api_key` when set, otherwise from a JSON
//! credential file holding an OAuth-style access token:
//!
//! ```json
//! { "claudeAiOauth": { "accessToken": "..." } }
//! ```
//!
//! A flat `{ "access_token": "..." }` file is accepted too.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::ProviderConfig;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(rename = "claudeAiOauth")]
    oauth: Option<OAuthSection>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthSection {
    access_token: Option<String>,
}

/// A resolved access token.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// `~/.claude/.credentials.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
            .join(".credentials.json")
    }

    /// Read the token from a credential file. A missing file or missing token
    /// is an error; callers treat it as fatal at startup.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: CredentialFile = serde_json::from_str(&contents).map_err(|e| {
            AgentError::Credentials(format!("invalid credential file {}: {}", path.display(), e))
        })?;

        file.oauth
            .and_then(|o| o.access_token)
            .or(file.access_token)
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                AgentError::Credentials(format!("no access token in {}", path.display()))
            })
    }

    /// Inline `api_key` wins; otherwise the configured or default credential file.
    pub fn resolve(provider: &ProviderConfig) -> Result<Self, AgentError> {
        if let Some(key) = provider.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(Self::new(key.clone()));
        }
        let path = provider
            .credentials_path
            .clone()
            .unwrap_or_else(Self::default_path);
        Self::load(&path)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}
