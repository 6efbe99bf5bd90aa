//! Error types for the engine
//!
//! Transport faults are the only truly exceptional condition. Everything a
//! caller is expected to handle (server validation, failed option loads,
//! local mapping violations) comes back as a typed value so the calling
//! layer can render it.

use crate::walker::{walk, Segment};
use formflow_client::{ApiResponse, ClientError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network unreachable or malformed response
    #[error("Transport error: {0}")]
    Transport(ClientError),

    /// Non-2xx while loading supporting data (options, schemas); retryable
    #[error("Failed to load {}: status {}", .request, .response.status)]
    BackendLoading {
        request: RequestSpec,
        response: ApiResponse,
    },

    /// Server rejected a write
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Local mapping invariant violated; nothing was sent
    #[error("Mapping invalid: {}", join(.0))]
    Mapping(Vec<MappingViolation>),

    /// Response body did not have the expected shape
    #[error("Unexpected response shape: {0}")]
    Hydration(String),

    /// Step reference did not match any step on the form
    #[error("Unknown step: {0}")]
    UnknownStep(String),
}

impl EngineError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::BackendLoading { .. })
    }

    pub(crate) fn loading(request: RequestSpec, response: ApiResponse) -> Self {
        EngineError::BackendLoading { request, response }
    }

    /// Classify a failed read of supporting data
    pub(crate) fn from_load(err: ClientError, request: RequestSpec) -> Self {
        match err {
            ClientError::Response(response) => EngineError::loading(request, response),
            other => other.into(),
        }
    }
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Response(response) => EngineError::Validation(ValidationErrors::from_response(response)),
            ClientError::Json(e) => EngineError::Hydration(e.to_string()),
            other => EngineError::Transport(other),
        }
    }
}

fn join(violations: &[MappingViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Originating request of a failed load, kept for retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new(path: impl Into<String>, query: &[(&str, &str)]) -> Self {
        Self {
            path: path.into(),
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, k, v)?;
        }
        Ok(())
    }
}

/// A single field-level error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field; empty for form-wide errors
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Server-reported validation errors, with the untouched response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
    pub response: ApiResponse,
}

impl ValidationErrors {
    /// Extract field errors from an error response.
    ///
    /// Understands the `invalidParams` list and the field-map shape
    /// (`{"field": ["message"]}`, nested arbitrarily); falls back to
    /// `detail` or the raw body as a single form-wide error.
    pub fn from_response(response: ApiResponse) -> Self {
        let errors = match response.data.get("invalidParams").and_then(Value::as_array) {
            Some(params) => params.iter().filter_map(invalid_param).collect(),
            None => field_map_errors(&response.data),
        };
        Self { errors, response }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Errors for one field path
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.path == path)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}, {} error(s)", self.response.status, self.errors.len())
    }
}

fn invalid_param(param: &Value) -> Option<FieldError> {
    Some(FieldError {
        path: param.get("name")?.as_str()?.to_string(),
        message: param
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        code: param.get("code").and_then(Value::as_str).map(str::to_string),
    })
}

fn field_map_errors(data: &Value) -> Vec<FieldError> {
    match data {
        Value::Object(map) if map.len() == 1 && map.contains_key("detail") => vec![FieldError {
            path: String::new(),
            message: map["detail"].as_str().map(str::to_string).unwrap_or_else(|| map["detail"].to_string()),
            code: None,
        }],
        Value::Object(_) | Value::Array(_) => walk(data)
            .into_iter()
            .filter_map(|entry| {
                let message = entry.value.as_str()?.to_string();
                // a trailing index is the position in the message list, not part of the field
                let segments: Vec<Segment> = match entry.segments.last() {
                    Some(Segment::Index(_)) => entry.segments[..entry.segments.len() - 1].to_vec(),
                    _ => entry.segments.clone(),
                };
                let path = field_path(&segments);
                Some(FieldError { path, message, code: None })
            })
            .collect(),
        Value::Null => Vec::new(),
        Value::String(s) => vec![FieldError { path: String::new(), message: s.clone(), code: None }],
        other => vec![FieldError { path: String::new(), message: other.to_string(), code: None }],
    }
}

/// Dotted field path; form-wide keys map to the empty path
fn field_path(segments: &[Segment]) -> String {
    let parts: Vec<String> = segments.iter().map(ToString::to_string).collect();
    match parts.as_slice() {
        [only] if only == "non_field_errors" || only == "nonFieldErrors" || only == "detail" => String::new(),
        _ => parts.join("."),
    }
}

/// Local mapping invariant violations, detected before any write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingViolation {
    /// Two entries claim the same variable key
    DuplicateKey { variable_key: String },
    /// Two entries claim the same target path
    DuplicatePath { target_path: Vec<String>, variable_keys: Vec<String> },
    /// A required target path has no variable assigned
    RequiredUnmapped { target_path: Vec<String> },
    /// A mapping points at a path the target schema does not offer
    UnknownPath { variable_key: String, target_path: Vec<String> },
}

impl fmt::Display for MappingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingViolation::DuplicateKey { variable_key } => {
                write!(f, "variable '{}' is mapped more than once", variable_key)
            }
            MappingViolation::DuplicatePath { target_path, variable_keys } => write!(
                f,
                "target path {:?} is claimed by {}",
                target_path,
                variable_keys.join(", ")
            ),
            MappingViolation::RequiredUnmapped { target_path } => {
                write!(f, "required target path {:?} has no variable", target_path)
            }
            MappingViolation::UnknownPath { variable_key, target_path } => write!(
                f,
                "variable '{}' maps to unknown target path {:?}",
                variable_key, target_path
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_params_shape() {
        let errors = ValidationErrors::from_response(ApiResponse::new(400, json!({
            "type": "validation-error",
            "invalidParams": [
                {"name": "data.email", "code": "invalid", "reason": "Enter a valid email address."},
                {"name": "formStep", "code": "required", "reason": "This field is required."}
            ]
        })));
        assert_eq!(errors.errors.len(), 2);
        assert_eq!(errors.errors[0].path, "data.email");
        assert_eq!(errors.errors[0].code.as_deref(), Some("invalid"));
        assert_eq!(errors.for_path("formStep").count(), 1);
    }

    #[test]
    fn test_field_map_shape_nested() {
        let errors = ValidationErrors::from_response(ApiResponse::new(400, json!({
            "data": {"email": ["Enter a valid email address.", "Too long."]},
            "non_field_errors": ["Submission is closed."]
        })));
        let paths: Vec<&str> = errors.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["data.email", "data.email", ""]);
        assert_eq!(errors.errors[2].message, "Submission is closed.");
    }

    #[test]
    fn test_detail_only_body() {
        let errors = ValidationErrors::from_response(ApiResponse::new(403, json!({"detail": "Forbidden."})));
        assert_eq!(errors.errors, vec![FieldError { path: String::new(), message: "Forbidden.".into(), code: None }]);
        assert_eq!(errors.status(), 403);
    }

    #[test]
    fn test_response_error_becomes_validation() {
        let err: EngineError = ClientError::Response(ApiResponse::new(400, json!({}))).into();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_spec_display() {
        let spec = RequestSpec::new("/api/v2/catalogues", &[("group", "1"), ("q", "x")]);
        assert_eq!(spec.to_string(), "/api/v2/catalogues?group=1&q=x");
    }
}
