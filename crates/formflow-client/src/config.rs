//! Client configuration

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "FORMFLOW_BASE_URL";
/// Environment variable overriding `api_key`
pub const ENV_API_KEY: &str = "FORMFLOW_API_KEY";

/// Resource client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the forms API (e.g. "https://forms.example.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional API token, sent as `Authorization: Token <key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds; none unless the caller sets one
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Preferred response language, sent as `Accept-Language`
    #[serde(default)]
    pub language: Option<String>,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_user_agent() -> String { format!("formflow/{}", env!("CARGO_PKG_VERSION")) }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: None,
            language: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Apply `FORMFLOW_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(api_key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api_key = Some(api_key);
        }
        self
    }
}
