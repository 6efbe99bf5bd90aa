//! Target path discovery over JSON schemas

use crate::error::{EngineError, RequestSpec, Result};
use formflow_client::{ClientError, ResourceClient, Transport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const TARGET_PATHS_ENDPOINT: &str = "/api/v2/registration/plugins/objects-api/target-paths";

/// An addressable location in a target schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPathDescriptor {
    pub target_path: Vec<String>,
    pub is_required: bool,
    /// Sub-schema at this location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

/// Flatten a JSON schema into its addressable locations.
///
/// One descriptor per object property, nested properties included, in
/// schema order. Array items are not enumerated. The root (empty path) is
/// offered when the root is an object or a scalar. A path is required when
/// every property along it is listed in its parent's `required`. Local
/// `$ref`s (`#/definitions/...`, `#/$defs/...`) are followed once per branch.
pub fn resolve_target_paths(schema: &Value) -> Vec<TargetPathDescriptor> {
    let mut out = Vec::new();
    let root = deref(schema, schema);

    if !types_of(root).iter().any(|t| t == "array") {
        out.push(TargetPathDescriptor {
            target_path: Vec::new(),
            is_required: false,
            json_schema: Some(root.clone()),
        });
    }

    let mut visiting = HashSet::new();
    collect(schema, schema, &mut Vec::new(), true, &mut visiting, &mut out);
    out
}

fn collect(
    root: &Value,
    node: &Value,
    path: &mut Vec<String>,
    ancestors_required: bool,
    visiting: &mut HashSet<String>,
    out: &mut Vec<TargetPathDescriptor>,
) {
    let reference = node.get("$ref").and_then(Value::as_str).map(str::to_string);
    if let Some(ref r) = reference {
        // recursive schemas stop at the second visit of a ref
        if !visiting.insert(r.clone()) {
            return;
        }
    }
    let node = deref(root, node);

    let Some(properties) = node.get("properties").and_then(Value::as_object) else {
        if let Some(r) = reference {
            visiting.remove(&r);
        }
        return;
    };
    let required: HashSet<&str> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, child) in properties {
        path.push(name.clone());
        let is_required = ancestors_required && required.contains(name.as_str());
        out.push(TargetPathDescriptor {
            target_path: path.clone(),
            is_required,
            json_schema: Some(deref(root, child).clone()),
        });
        collect(root, child, path, is_required, visiting, out);
        path.pop();
    }

    if let Some(r) = reference {
        visiting.remove(&r);
    }
}

/// Follow a local `$ref`; anything unresolvable is returned unchanged
fn deref<'a>(root: &'a Value, node: &'a Value) -> &'a Value {
    let mut current = node;
    // bounded so a ref cycle without properties cannot spin forever
    for _ in 0..32 {
        let Some(pointer) = current.get("$ref").and_then(Value::as_str).and_then(|r| r.strip_prefix('#')) else {
            break;
        };
        match root.pointer(pointer) {
            Some(target) => current = target,
            None => break,
        }
    }
    current
}

fn types_of(schema: &Value) -> Vec<String> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Descriptors whose schema type accepts a variable of `variable_schema`.
///
/// Descriptors without a declared type accept anything.
pub fn compatible_target_paths<'a>(
    variable_schema: &Value,
    descriptors: &'a [TargetPathDescriptor],
) -> Vec<&'a TargetPathDescriptor> {
    let wanted = types_of(variable_schema);
    descriptors
        .iter()
        .filter(|d| {
            let offered = d.json_schema.as_ref().map(types_of).unwrap_or_default();
            wanted.is_empty()
                || offered.is_empty()
                || offered.iter().any(|t| {
                    wanted.contains(t) || (t == "number" && wanted.iter().any(|w| w == "integer"))
                })
        })
        .collect()
}

/// Body of a target path lookup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPathsRequest {
    pub objecttype_url: String,
    pub objecttype_version: u32,
    pub variable_json_schema: Value,
}

/// Ask the Objects API backend which paths of an object type fit a variable
pub async fn fetch_target_paths<T: Transport>(
    client: &ResourceClient<T>,
    request: &TargetPathsRequest,
) -> Result<Vec<TargetPathDescriptor>> {
    let data = client
        .create(TARGET_PATHS_ENDPOINT, request)
        .await
        .map_err(|e| match e {
            ClientError::Response(response) => {
                EngineError::loading(RequestSpec::new(TARGET_PATHS_ENDPOINT, &[]), response)
            }
            other => other.into(),
        })?;

    let descriptors: Vec<TargetPathDescriptor> =
        serde_json::from_value(data).map_err(|e| EngineError::Hydration(e.to_string()))?;
    debug!(
        objecttype = %request.objecttype_url,
        version = request.objecttype_version,
        count = descriptors.len(),
        "target paths fetched"
    );
    Ok(descriptors)
}
