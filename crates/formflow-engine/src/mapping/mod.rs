//! Variable mapping for registration backends
//!
//! A [`MappingSet`] associates form variable keys with target paths in a
//! backend's JSON schema. Both sides are unique: one mapping per variable,
//! one variable per path.

pub mod target_paths;

pub use target_paths::{
    compatible_target_paths, fetch_target_paths, resolve_target_paths, TargetPathDescriptor, TargetPathsRequest,
};

use crate::error::{EngineError, MappingViolation, Result};
use formflow_client::{ResourceClient, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Options key under which backends store their mapping
pub const VARIABLES_MAPPING_KEY: &str = "variablesMapping";

/// One variable-to-path association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMapping {
    pub variable_key: String,
    pub target_path: Vec<String>,
    #[serde(default)]
    pub is_required: bool,
}

/// The parts of a form variable that mapping depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub key: String,
    pub data_type: String,
}

impl Variable {
    pub fn new(key: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data_type: data_type.into(),
        }
    }
}

/// Effect of an [`MappingSet::assign`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    /// Mapping of another variable that owned the path before
    pub evicted: Option<VariableMapping>,
    /// Path this variable was mapped to before, if it moved
    pub previous_path: Option<Vec<String>>,
}

/// Set of mappings with unique keys and unique paths
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct MappingSet {
    entries: Vec<VariableMapping>,
}

impl<'de> Deserialize<'de> for MappingSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = Vec::<VariableMapping>::deserialize(deserializer)?;
        MappingSet::from_entries(entries).map_err(|violations| {
            let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
            serde::de::Error::custom(messages.join("; "))
        })
    }
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted entries, rejecting duplicate keys or paths
    pub fn from_entries(entries: Vec<VariableMapping>) -> std::result::Result<Self, Vec<MappingViolation>> {
        let mut violations = Vec::new();
        let mut keys: HashSet<String> = HashSet::new();
        let mut owners: HashMap<Vec<String>, Vec<String>> = HashMap::new();

        for entry in &entries {
            if !keys.insert(entry.variable_key.clone()) {
                violations.push(MappingViolation::DuplicateKey {
                    variable_key: entry.variable_key.clone(),
                });
            }
            owners
                .entry(entry.target_path.clone())
                .or_default()
                .push(entry.variable_key.clone());
        }
        for entry in &entries {
            if let Some(variable_keys) = owners.remove(&entry.target_path) {
                if variable_keys.len() > 1 {
                    violations.push(MappingViolation::DuplicatePath {
                        target_path: entry.target_path.clone(),
                        variable_keys,
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(Self { entries })
        } else {
            Err(violations)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableMapping> {
        self.entries.iter()
    }

    pub fn get(&self, variable_key: &str) -> Option<&VariableMapping> {
        self.entries.iter().find(|m| m.variable_key == variable_key)
    }

    /// Variable currently mapped to `target_path`
    pub fn owner_of(&self, target_path: &[String]) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.target_path == target_path)
            .map(|m| m.variable_key.as_str())
    }

    /// Map `variable_key` to `target_path`.
    ///
    /// A different variable that owned the path loses its mapping; the
    /// evicted entry is reported back. The entry is stored as not required;
    /// use [`assign_target`](Self::assign_target) or
    /// [`refresh_required`](Self::refresh_required) to carry the schema's flag.
    pub fn assign(&mut self, variable_key: impl Into<String>, target_path: Vec<String>) -> Assignment {
        self.upsert(VariableMapping {
            variable_key: variable_key.into(),
            target_path,
            is_required: false,
        })
    }

    /// Like [`assign`](Self::assign), carrying the descriptor's required flag
    pub fn assign_target(&mut self, variable_key: impl Into<String>, target: &TargetPathDescriptor) -> Assignment {
        self.upsert(VariableMapping {
            variable_key: variable_key.into(),
            target_path: target.target_path.clone(),
            is_required: target.is_required,
        })
    }

    fn upsert(&mut self, mapping: VariableMapping) -> Assignment {
        let mut assignment = Assignment::default();

        if let Some(pos) = self
            .entries
            .iter()
            .position(|m| m.target_path == mapping.target_path && m.variable_key != mapping.variable_key)
        {
            let evicted = self.entries.remove(pos);
            info!(
                evicted = %evicted.variable_key,
                by = %mapping.variable_key,
                path = ?mapping.target_path,
                "target path reassigned"
            );
            assignment.evicted = Some(evicted);
        }

        match self.entries.iter_mut().find(|m| m.variable_key == mapping.variable_key) {
            Some(existing) => {
                if existing.target_path != mapping.target_path {
                    assignment.previous_path = Some(existing.target_path.clone());
                }
                *existing = mapping;
            }
            None => self.entries.push(mapping),
        }
        assignment
    }

    /// Copy each entry's required flag from the matching descriptor.
    ///
    /// Entries without a matching descriptor keep their flag.
    pub fn refresh_required(&mut self, descriptors: &[TargetPathDescriptor]) {
        for entry in &mut self.entries {
            if let Some(descriptor) = descriptors.iter().find(|d| d.target_path == entry.target_path) {
                entry.is_required = descriptor.is_required;
            }
        }
    }

    /// Remove the mapping of one variable
    pub fn unassign(&mut self, variable_key: &str) -> Option<VariableMapping> {
        let pos = self.entries.iter().position(|m| m.variable_key == variable_key)?;
        Some(self.entries.remove(pos))
    }

    /// React to a variable being edited or removed.
    ///
    /// `original == None` means the variable was removed. A removed variable
    /// or a changed data type drops the mapping; a changed key renames it.
    /// Returns `None` when nothing changes. Pure: `self` is not modified.
    pub fn on_variable_edited(&self, variable: &Variable, original: Option<&Variable>) -> Option<MappingSet> {
        let Some(original) = original else {
            return self.without(&variable.key);
        };

        if variable.data_type != original.data_type {
            debug!(
                key = %original.key,
                from = %original.data_type,
                to = %variable.data_type,
                "data type changed, dropping mapping"
            );
            return self.without(&original.key);
        }

        if variable.key != original.key {
            self.get(&original.key)?;
            let mut next = self.clone();
            // a stale mapping under the new key would become a duplicate
            next.unassign(&variable.key);
            if let Some(mapping) = next.entries.iter_mut().find(|m| m.variable_key == original.key) {
                mapping.variable_key = variable.key.clone();
            }
            debug!(from = %original.key, to = %variable.key, "mapping renamed");
            return Some(next);
        }

        None
    }

    fn without(&self, variable_key: &str) -> Option<MappingSet> {
        self.get(variable_key)?;
        let mut next = self.clone();
        next.unassign(variable_key);
        Some(next)
    }

    /// Check completeness against the target schema's descriptors
    pub fn validate_for_save(
        &self,
        descriptors: &[TargetPathDescriptor],
    ) -> std::result::Result<(), Vec<MappingViolation>> {
        let mut violations: Vec<MappingViolation> = self
            .entries
            .iter()
            .filter(|m| !descriptors.iter().any(|d| d.target_path == m.target_path))
            .map(|m| MappingViolation::UnknownPath {
                variable_key: m.variable_key.clone(),
                target_path: m.target_path.clone(),
            })
            .collect();

        violations.extend(
            descriptors
                .iter()
                .filter(|d| d.is_required && self.owner_of(&d.target_path).is_none())
                .map(|d| MappingViolation::RequiredUnmapped {
                    target_path: d.target_path.clone(),
                }),
        );

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Build the target document from variable values.
    ///
    /// Variables without a value are skipped. A root mapping supplies the
    /// whole document; objects are merged into it.
    pub fn apply(&self, values: &Map<String, Value>) -> Value {
        let mut document = Value::Object(Map::new());
        let (root, nested): (Vec<&VariableMapping>, Vec<&VariableMapping>) =
            self.entries.iter().partition(|m| m.target_path.is_empty());

        for mapping in root {
            if let Some(value) = values.get(&mapping.variable_key) {
                document = value.clone();
            }
        }
        for mapping in nested {
            if let Some(value) = values.get(&mapping.variable_key) {
                set_path(&mut document, &mapping.target_path, value.clone());
            }
        }
        document
    }
}

fn set_path(document: &mut Value, path: &[String], value: Value) {
    let mut current = document;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else { return };
        current = map.entry(segment.clone()).or_insert(Value::Null);
    }
    *current = value;
}

/// Configuration of one registration backend on a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBackend {
    pub key: String,
    pub backend: String,
    #[serde(default)]
    pub options: Value,
}

impl RegistrationBackend {
    /// The backend's mapping, if it keeps one
    pub fn mapping(&self) -> Result<Option<MappingSet>> {
        match self.options.get(VARIABLES_MAPPING_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|e| EngineError::Hydration(format!("{}: {}", self.key, e))),
        }
    }

    fn set_mapping(&mut self, mapping: &MappingSet) -> Result<()> {
        if !self.options.is_object() {
            self.options = Value::Object(Map::new());
        }
        let raw = serde_json::to_value(mapping).map_err(|e| EngineError::Hydration(e.to_string()))?;
        if let Value::Object(ref mut options) = self.options {
            options.insert(VARIABLES_MAPPING_KEY.to_string(), raw);
        }
        Ok(())
    }
}

/// Apply a variable edit to every backend that maps variables.
///
/// Returns the keys of the backends whose configuration changed.
pub fn propagate_variable_edit(
    backends: &mut [RegistrationBackend],
    variable: &Variable,
    original: Option<&Variable>,
) -> Result<Vec<String>> {
    let mut changed = Vec::new();
    for backend in backends.iter_mut() {
        let Some(mapping) = backend.mapping()? else { continue };
        if let Some(next) = mapping.on_variable_edited(variable, original) {
            backend.set_mapping(&next)?;
            changed.push(backend.key.clone());
        }
    }
    Ok(changed)
}

/// Validate locally, then write the mapping into a backend's options.
///
/// Violations short-circuit before any request is made. Required flags
/// are taken from `descriptors`.
pub async fn save_mapping<T: Transport>(
    client: &ResourceClient<T>,
    path: &str,
    mapping: &MappingSet,
    descriptors: &[TargetPathDescriptor],
) -> Result<Value> {
    mapping.validate_for_save(descriptors).map_err(EngineError::Mapping)?;
    let mut mapping = mapping.clone();
    mapping.refresh_required(descriptors);
    let body = json!({ "options": { VARIABLES_MAPPING_KEY: mapping } });
    Ok(client.partial_update(path, &body).await?)
}
