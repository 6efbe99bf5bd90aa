//! Error types for the resource client

use crate::response::ApiResponse;
use thiserror::Error;

/// Resource client error
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network unreachable or the response body could not be read
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Server answered with a well-formed non-2xx response
    #[error("Request failed with status {}", .0.status)]
    Response(ApiResponse),

    /// Base URL or resource path could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL template references a parameter that was not supplied
    #[error("Missing URL parameter '{param}' for template {template}")]
    MissingParam { template: String, param: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        ClientError::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// True for network-level failures, as opposed to server-reported ones
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }

    /// The original server response, when the failure carries one
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ClientError::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(e: toml::de::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Result type for resource client operations
pub type Result<T> = std::result::Result<T, ClientError>;
