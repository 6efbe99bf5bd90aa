//! Form and submission entities

use chrono::{DateTime, Utc};
use formflow_client::{Entity, EntityDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Address of a form step: by position or by stable uuid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepRef {
    Index(usize),
    Uuid(Uuid),
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRef::Index(index) => write!(f, "#{}", index),
            StepRef::Uuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

impl From<usize> for StepRef {
    fn from(index: usize) -> Self {
        StepRef::Index(index)
    }
}

impl From<Uuid> for StepRef {
    fn from(uuid: Uuid) -> Self {
        StepRef::Uuid(uuid)
    }
}

/// A step as listed on its form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStepSummary {
    pub uuid: Uuid,
    pub url: String,
    pub index: usize,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

impl FormStepSummary {
    /// Whether a reference (URL or bare uuid) points at this step
    pub fn matches_ref(&self, reference: &str) -> bool {
        let reference = reference.trim_end_matches('/');
        reference == self.url.trim_end_matches('/')
            || reference.rsplit('/').next() == Some(self.uuid.to_string().as_str())
    }

    pub fn matches(&self, step: &StepRef) -> bool {
        match step {
            StepRef::Index(index) => self.index == *index,
            StepRef::Uuid(uuid) => self.uuid == *uuid,
        }
    }
}

/// A form definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    uuid: Uuid,
    url: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<FormStepSummary>,
    /// Server-assigned step where the user left off
    #[serde(default)]
    pub current_step: Option<Uuid>,
    /// Step definitions fetched so far
    #[serde(default, rename = "_loadedSteps")]
    pub loaded_steps: Vec<FormStep>,
}

impl Entity for Form {
    const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        name: "form",
        collection: "/api/v1/forms",
        read_only: &["uuid", "url"],
        local_only: &["_loadedSteps"],
    };
}

impl Form {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Steps sorted by index
    pub fn ordered_steps(&self) -> Vec<&FormStepSummary> {
        let mut steps: Vec<&FormStepSummary> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.index);
        steps
    }

    pub fn find_step(&self, step: &StepRef) -> Option<&FormStepSummary> {
        self.steps.iter().find(|s| s.matches(step))
    }

    pub fn find_step_by_ref(&self, reference: &str) -> Option<&FormStepSummary> {
        self.steps.iter().find(|s| s.matches_ref(reference))
    }
}

/// Full definition of one form step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStep {
    uuid: Uuid,
    url: String,
    pub index: usize,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    /// Reference to the reusable step definition
    #[serde(default)]
    pub form_definition: Option<String>,
    /// Field layout, rendered elsewhere
    #[serde(default)]
    pub configuration: Value,
}

impl Entity for FormStep {
    const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        name: "form step",
        collection: "/api/v1/forms/{form}/steps",
        read_only: &["uuid", "url"],
        local_only: &[],
    };
}

impl FormStep {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Server view of one step within a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStepSummary {
    #[serde(alias = "form_step")]
    pub form_step: String,
    #[serde(default = "default_true")]
    pub is_applicable: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_true")]
    pub can_submit: bool,
}

fn default_true() -> bool { true }

/// One end-user attempt at a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(alias = "id")]
    uuid: Uuid,
    url: String,
    /// URL of the form
    pub form: String,
    #[serde(default)]
    pub steps: Vec<SubmissionStepSummary>,
    #[serde(default)]
    pub next_step: Option<String>,
}

impl Entity for Submission {
    const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        name: "submission",
        collection: "/api/v1/submissions/",
        read_only: &["uuid", "url", "steps", "nextStep"],
        local_only: &[],
    };
}

impl Submission {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Data recorded for one form step of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStep {
    #[serde(default)]
    id: Option<String>,
    /// Reference (URL or uuid) of the form step this data belongs to
    #[serde(alias = "form_step")]
    pub form_step: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

impl Entity for SubmissionStep {
    const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        name: "submission step",
        collection: "/api/v1/submission/{submission}/steps/",
        read_only: &["id", "completedAt"],
        local_only: &[],
    };
}

impl SubmissionStep {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

/// Body of a step write
#[derive(Debug, Clone, Serialize)]
pub struct SubmitStepRequest<'a> {
    pub form_step: &'a str,
    pub data: &'a Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> Form {
        serde_json::from_value(json!({
            "uuid": "7c1a9b3e-3f0b-4b8a-9a57-2f1c3c1d4e01",
            "url": "http://forms.test/api/v1/forms/7c1a9b3e-3f0b-4b8a-9a57-2f1c3c1d4e01",
            "slug": "permit",
            "steps": [
                {"uuid": "00000000-0000-0000-0000-000000000002", "url": "http://forms.test/api/v1/forms/f/steps/00000000-0000-0000-0000-000000000002", "index": 1},
                {"uuid": "00000000-0000-0000-0000-000000000001", "url": "http://forms.test/api/v1/forms/f/steps/00000000-0000-0000-0000-000000000001", "index": 0}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_ordered_steps_by_index() {
        let form = form();
        let indices: Vec<usize> = form.ordered_steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_step_refs_resolve() {
        let form = form();
        let by_index = form.find_step(&StepRef::Index(1)).unwrap();
        assert_eq!(by_index.uuid.to_string(), "00000000-0000-0000-0000-000000000002");
        assert!(form.find_step_by_ref("00000000-0000-0000-0000-000000000001").is_some());
        assert!(form
            .find_step_by_ref("http://forms.test/api/v1/forms/f/steps/00000000-0000-0000-0000-000000000002/")
            .is_some());
        assert!(form.find_step(&StepRef::Index(5)).is_none());
    }

    #[test]
    fn test_form_wire_excludes_identity_and_loaded_steps() {
        let wire = form().to_wire().unwrap();
        assert!(wire.get("uuid").is_none());
        assert!(wire.get("url").is_none());
        assert!(wire.get("_loadedSteps").is_none());
        assert_eq!(wire["slug"], "permit");
    }

    #[test]
    fn test_submission_step_accepts_both_spellings() {
        let camel: SubmissionStep = serde_json::from_value(json!({"formStep": "s", "data": {"a": 1}})).unwrap();
        let snake: SubmissionStep = serde_json::from_value(json!({"form_step": "s", "data": {"a": 1}})).unwrap();
        assert_eq!(camel, snake);
        assert!(camel.completed_at().is_none());
    }
}
