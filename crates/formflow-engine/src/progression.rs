//! Submission progression
//!
//! A [`SubmissionSession`] owns the known-good local view of one end-user
//! attempt: which form steps have recorded data and which are applicable.
//! Local state only changes after the server accepted a write.
//!
//! ```text
//!   create ──► Created ──submit──► InProgress ──submit (last required)──► Complete
//!                                      ▲   │
//!                                      └───┘ submit / overwrite
//! ```
//!
//! The session allows direct addressing of any step. Whether a caller may
//! jump past incomplete steps is a [`ProgressionPolicy`] decision.

use crate::error::{EngineError, RequestSpec, Result, ValidationErrors};
use crate::models::{Form, FormStep, FormStepSummary, StepRef, Submission, SubmissionStep, SubmitStepRequest};
use formflow_client::{ClientError, EntityResource, ResourceClient, Transport};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// No steps recorded yet
    Created,
    /// Some, but not all, applicable steps recorded
    InProgress,
    /// Every applicable step recorded
    Complete,
}

/// Result of a step write
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Accepted; the stored record
    Saved(SubmissionStep),
    /// Rejected by the server; local state untouched
    Rejected(ValidationErrors),
}

/// Result of a completion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Completed(Value),
    /// Applicable steps without recorded data, in form order
    Incomplete(Vec<Uuid>),
    Rejected(ValidationErrors),
}

/// Navigation rule applied by callers on top of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressionPolicy {
    /// Any step may be opened directly
    #[default]
    Free,
    /// A step may only be opened once every applicable predecessor is recorded
    Strict,
}

impl ProgressionPolicy {
    /// The first incomplete predecessor that blocks navigation to `target`
    pub fn blocking_step<'a, T: Transport>(
        &self,
        session: &'a SubmissionSession<T>,
        target: &StepRef,
    ) -> Option<&'a FormStepSummary> {
        match self {
            ProgressionPolicy::Free => None,
            ProgressionPolicy::Strict => {
                let target_index = session.form.find_step(target)?.index;
                session
                    .applicable_steps()
                    .into_iter()
                    .filter(|s| s.index < target_index)
                    .find(|s| !session.is_recorded(s.uuid))
            }
        }
    }

    pub fn allows<T: Transport>(&self, session: &SubmissionSession<T>, target: &StepRef) -> bool {
        self.blocking_step(session, target).is_none()
    }
}

/// Fetch a step definition through the form's step collection.
///
/// With no explicit reference, resolves the form's current-step pointer,
/// falling back to the first step.
pub async fn read_step<T: Transport>(
    client: &ResourceClient<T>,
    form: &Form,
    step: Option<StepRef>,
) -> Result<FormStep> {
    let summary = match step {
        Some(ref step) => form.find_step(step),
        None => match form.current_step {
            Some(uuid) => form.find_step(&StepRef::Uuid(uuid)),
            None => form.ordered_steps().into_iter().next(),
        },
    }
    .ok_or_else(|| {
        EngineError::UnknownStep(step.map_or_else(|| "current step".to_string(), |s| s.to_string()))
    })?;

    let form_uuid = form.uuid().to_string();
    let steps = EntityResource::<FormStep, T>::new(client, &[("form", form_uuid.as_str())])?;
    let id = summary.uuid.to_string();
    debug!(form = %form_uuid, step = %id, "reading form step");
    steps
        .read(&id)
        .await
        .map_err(|e| EngineError::from_load(e, RequestSpec::new(steps.item_path(&id), &[])))
}

/// Client-side state of one submission
pub struct SubmissionSession<T: Transport> {
    client: Arc<ResourceClient<T>>,
    form: Form,
    submission: Submission,
    /// Recorded steps keyed by form step uuid
    recorded: BTreeMap<Uuid, SubmissionStep>,
    applicable: HashMap<Uuid, bool>,
}

impl<T: Transport> SubmissionSession<T> {
    /// Start a new submission for `form`
    pub async fn create(client: Arc<ResourceClient<T>>, form: Form) -> Result<Self> {
        let submissions = EntityResource::<Submission, T>::new(&client, &[])?;
        let submission = submissions.create(&json!({ "form": form.url() })).await?;
        info!(submission = %submission.uuid(), form = %form.uuid(), "submission created");

        let mut session = Self {
            client,
            form,
            submission,
            recorded: BTreeMap::new(),
            applicable: HashMap::new(),
        };
        session.sync_applicability();
        Ok(session)
    }

    /// Resume an existing submission, loading its recorded steps
    pub async fn resume(client: Arc<ResourceClient<T>>, form: Form, submission_uuid: Uuid) -> Result<Self> {
        let submission = load_submission(&client, submission_uuid).await?;

        let mut session = Self {
            client,
            form,
            submission,
            recorded: BTreeMap::new(),
            applicable: HashMap::new(),
        };
        session.reload_steps().await?;
        session.sync_applicability();
        info!(submission = %submission_uuid, state = ?session.state(), "submission resumed");
        Ok(session)
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// `Complete` takes precedence, so a submission with no applicable
    /// steps is complete before anything is recorded
    pub fn state(&self) -> SubmissionState {
        if self.missing_steps().is_empty() {
            SubmissionState::Complete
        } else if self.recorded.is_empty() {
            SubmissionState::Created
        } else {
            SubmissionState::InProgress
        }
    }

    pub fn is_recorded(&self, form_step: Uuid) -> bool {
        self.recorded.contains_key(&form_step)
    }

    /// Recorded data for a step, if any
    pub fn recorded_step(&self, form_step: Uuid) -> Option<&SubmissionStep> {
        self.recorded.get(&form_step)
    }

    pub fn recorded_steps(&self) -> impl Iterator<Item = &SubmissionStep> {
        self.recorded.values()
    }

    pub fn is_applicable(&self, form_step: Uuid) -> bool {
        self.applicable.get(&form_step).copied().unwrap_or(true)
    }

    /// Override applicability, as evaluated by form logic elsewhere
    pub fn set_applicable(&mut self, form_step: Uuid, applicable: bool) {
        self.applicable.insert(form_step, applicable);
    }

    /// Applicable steps in form order
    pub fn applicable_steps(&self) -> Vec<&FormStepSummary> {
        self.form
            .ordered_steps()
            .into_iter()
            .filter(|s| self.is_applicable(s.uuid))
            .collect()
    }

    /// Applicable steps without recorded data, in form order
    pub fn missing_steps(&self) -> Vec<&FormStepSummary> {
        self.applicable_steps()
            .into_iter()
            .filter(|s| !self.is_recorded(s.uuid))
            .collect()
    }

    pub fn first_incomplete_step(&self) -> Option<&FormStepSummary> {
        self.missing_steps().into_iter().next()
    }

    /// The applicable step following `current` by index
    pub fn next_step(&self, current: &StepRef) -> Option<&FormStepSummary> {
        let index = self.form.find_step(current)?.index;
        self.applicable_steps().into_iter().find(|s| s.index > index)
    }

    /// The applicable step preceding `current` by index
    pub fn previous_step(&self, current: &StepRef) -> Option<&FormStepSummary> {
        let index = self.form.find_step(current)?.index;
        self.applicable_steps().into_iter().rev().find(|s| s.index < index)
    }

    /// Fetch a step definition; `None` resolves the form's current step
    pub async fn read_step(&self, step: Option<StepRef>) -> Result<FormStep> {
        read_step(&self.client, &self.form, step).await
    }

    /// Record data for a step.
    ///
    /// Re-submitting a step replaces its earlier record. On a non-2xx
    /// response nothing local changes and the server's errors are returned.
    pub async fn submit_step(&mut self, step: StepRef, data: Map<String, Value>) -> Result<StepOutcome> {
        let summary = self
            .form
            .find_step(&step)
            .ok_or_else(|| EngineError::UnknownStep(step.to_string()))?
            .clone();

        let submission_uuid = self.submission.uuid().to_string();
        let steps = EntityResource::<SubmissionStep, T>::new(&self.client, &[("submission", submission_uuid.as_str())])?;
        let request = SubmitStepRequest {
            form_step: &summary.url,
            data: &data,
        };

        let saved = match steps.create(&request).await {
            Ok(saved) => saved,
            Err(ClientError::Response(response)) => {
                warn!(
                    submission = %submission_uuid,
                    step = %summary.uuid,
                    status = response.status,
                    "step submission rejected"
                );
                return Ok(StepOutcome::Rejected(ValidationErrors::from_response(response)));
            }
            Err(e) => return Err(e.into()),
        };

        let before = self.state();
        self.recorded.insert(summary.uuid, saved.clone());
        let after = self.state();
        if before != after {
            info!(submission = %submission_uuid, from = ?before, to = ?after, "submission state changed");
        }
        Ok(StepOutcome::Saved(saved))
    }

    /// Replace local state with the server's
    pub async fn refresh(&mut self) -> Result<()> {
        self.submission = load_submission(&self.client, self.submission.uuid()).await?;
        self.reload_steps().await?;
        self.applicable.clear();
        self.sync_applicability();
        Ok(())
    }

    /// Finalize the submission once every applicable step is recorded
    pub async fn complete(&mut self) -> Result<CompletionOutcome> {
        let missing: Vec<Uuid> = self.missing_steps().iter().map(|s| s.uuid).collect();
        if !missing.is_empty() {
            return Ok(CompletionOutcome::Incomplete(missing));
        }

        let path = format!("{}/_complete", self.submission.url().trim_end_matches('/'));
        match self.client.create(&path, &json!({})).await {
            Ok(body) => {
                info!(submission = %self.submission.uuid(), "submission completed");
                Ok(CompletionOutcome::Completed(body))
            }
            Err(ClientError::Response(response)) => {
                Ok(CompletionOutcome::Rejected(ValidationErrors::from_response(response)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reload_steps(&mut self) -> Result<()> {
        let submission_uuid = self.submission.uuid().to_string();
        let steps = EntityResource::<SubmissionStep, T>::new(&self.client, &[("submission", submission_uuid.as_str())])?;

        let listed = steps
            .list()
            .await
            .map_err(|e| EngineError::from_load(e, RequestSpec::new(steps.collection_path(), &[])))?;

        let mut recorded = BTreeMap::new();
        for step in listed {
            match self.form.find_step_by_ref(&step.form_step) {
                // later records for the same form step replace earlier ones
                Some(summary) => {
                    recorded.insert(summary.uuid, step);
                }
                None => warn!(form_step = %step.form_step, "recorded step does not belong to this form"),
            }
        }
        self.recorded = recorded;
        Ok(())
    }

    fn sync_applicability(&mut self) {
        for summary in &self.submission.steps {
            if let Some(step) = self.form.find_step_by_ref(&summary.form_step) {
                self.applicable.insert(step.uuid, summary.is_applicable);
            }
        }
    }
}

async fn load_submission<T: Transport>(client: &ResourceClient<T>, uuid: Uuid) -> Result<Submission> {
    let submissions = EntityResource::<Submission, T>::new(client, &[])?;
    let id = uuid.to_string();
    submissions
        .read(&id)
        .await
        .map_err(|e| EngineError::from_load(e, RequestSpec::new(submissions.item_path(&id), &[])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_client::{Method, MockTransport};

    const BASE: &str = "http://forms.test";
    const FORM: &str = "11111111-1111-1111-1111-111111111111";
    const SUB: &str = "22222222-2222-2222-2222-222222222222";
    const STEP_A: &str = "00000000-0000-0000-0000-00000000000a";
    const STEP_B: &str = "00000000-0000-0000-0000-00000000000b";
    const STEP_C: &str = "00000000-0000-0000-0000-00000000000c";

    fn step_url(uuid: &str) -> String {
        format!("{}/api/v1/forms/{}/steps/{}", BASE, FORM, uuid)
    }

    fn form(current: Option<&str>) -> Form {
        serde_json::from_value(json!({
            "uuid": FORM,
            "url": format!("{}/api/v1/forms/{}", BASE, FORM),
            "slug": "permit",
            "currentStep": current,
            "steps": [
                {"uuid": STEP_A, "url": step_url(STEP_A), "index": 0, "slug": "a"},
                {"uuid": STEP_B, "url": step_url(STEP_B), "index": 1, "slug": "b"},
                {"uuid": STEP_C, "url": step_url(STEP_C), "index": 2, "slug": "c"}
            ]
        }))
        .unwrap()
    }

    fn submission_body(applicable_b: bool) -> Value {
        json!({
            "id": SUB,
            "url": format!("{}/api/v1/submissions/{}", BASE, SUB),
            "form": format!("{}/api/v1/forms/{}", BASE, FORM),
            "steps": [
                {"formStep": step_url(STEP_A), "isApplicable": true, "completed": false},
                {"formStep": step_url(STEP_B), "isApplicable": applicable_b, "completed": false},
                {"formStep": step_url(STEP_C), "isApplicable": true, "completed": false}
            ]
        })
    }

    fn steps_path() -> String {
        format!("/api/v1/submission/{}/steps/", SUB)
    }

    fn data(pairs: Value) -> Map<String, Value> {
        pairs.as_object().cloned().unwrap_or_default()
    }

    fn uuid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    async fn session(mock: MockTransport) -> (Arc<ResourceClient<MockTransport>>, SubmissionSession<MockTransport>) {
        mock.add(Method::Post, "/api/v1/submissions/", 201, submission_body(true));
        let client = Arc::new(ResourceClient::with_transport(BASE, mock).unwrap());
        let session = SubmissionSession::create(client.clone(), form(None)).await.unwrap();
        (client, session)
    }

    #[tokio::test]
    async fn test_create_posts_form_url() {
        let (client, session) = session(MockTransport::new()).await;
        assert_eq!(session.state(), SubmissionState::Created);

        let requests = client.transport().requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body, Some(json!({"form": format!("{}/api/v1/forms/{}", BASE, FORM)})));
    }

    #[tokio::test]
    async fn test_resubmitting_step_overwrites() {
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {"name": "first"}}))
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {"name": "second"}}));
        let (_, mut session) = session(mock).await;

        session.submit_step(StepRef::Index(0), data(json!({"name": "first"}))).await.unwrap();
        let outcome = session.submit_step(StepRef::Index(0), data(json!({"name": "second"}))).await.unwrap();

        assert!(matches!(outcome, StepOutcome::Saved(_)));
        assert_eq!(session.recorded_steps().count(), 1);
        assert_eq!(session.recorded_step(uuid(STEP_A)).unwrap().data["name"], "second");
        assert_eq!(session.state(), SubmissionState::InProgress);
    }

    #[tokio::test]
    async fn test_submit_sends_form_step_url_and_data() {
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_B), "data": {"x": 1}}));
        let (client, mut session) = session(mock).await;

        session.submit_step(StepRef::Uuid(uuid(STEP_B)), data(json!({"x": 1}))).await.unwrap();
        let request = client.transport().requests().pop().unwrap();
        assert_eq!(request.body, Some(json!({"form_step": step_url(STEP_B), "data": {"x": 1}})));
    }

    #[tokio::test]
    async fn test_rejected_step_leaves_state_untouched() {
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {"email": "a@b.c"}}))
            .on(Method::Post, &steps_path(), 400, json!({
                "invalidParams": [{"name": "data.email", "code": "invalid", "reason": "Enter a valid email address."}]
            }));
        let (_, mut session) = session(mock).await;

        session.submit_step(StepRef::Index(0), data(json!({"email": "a@b.c"}))).await.unwrap();
        let outcome = session.submit_step(StepRef::Index(0), data(json!({"email": "nope"}))).await.unwrap();

        match outcome {
            StepOutcome::Rejected(errors) => {
                assert_eq!(errors.status(), 400);
                assert_eq!(errors.errors[0].path, "data.email");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(session.recorded_step(uuid(STEP_A)).unwrap().data["email"], "a@b.c");
    }

    #[tokio::test]
    async fn test_unknown_step_is_error_without_request() {
        let (client, mut session) = session(MockTransport::new()).await;
        let err = session.submit_step(StepRef::Index(9), Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownStep(_)));
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_follows_applicable_steps() {
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {}}))
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_C), "data": {}}));
        let (_, mut session) = session(mock).await;
        session.set_applicable(uuid(STEP_B), false);

        session.submit_step(StepRef::Index(0), Map::new()).await.unwrap();
        assert_eq!(session.state(), SubmissionState::InProgress);
        assert_eq!(session.next_step(&StepRef::Index(0)).unwrap().uuid, uuid(STEP_C));
        assert_eq!(session.previous_step(&StepRef::Index(2)).unwrap().uuid, uuid(STEP_A));

        session.submit_step(StepRef::Index(2), Map::new()).await.unwrap();
        assert_eq!(session.state(), SubmissionState::Complete);
        assert!(session.next_step(&StepRef::Index(2)).is_none());
    }

    #[tokio::test]
    async fn test_complete_refuses_with_missing_steps() {
        let (client, mut session) = session(MockTransport::new()).await;
        let outcome = session.complete().await.unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Incomplete(vec![uuid(STEP_A), uuid(STEP_B), uuid(STEP_C)])
        );
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_posts_when_all_recorded() {
        let complete_path = format!("/api/v1/submissions/{}/_complete", SUB);
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {}}))
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_B), "data": {}}))
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_C), "data": {}}))
            .on(Method::Post, &complete_path, 200, json!({"statusUrl": "http://forms.test/status"}));
        let (_, mut session) = session(mock).await;

        for index in 0..3 {
            session.submit_step(StepRef::Index(index), Map::new()).await.unwrap();
        }
        let outcome = session.complete().await.unwrap();
        assert_eq!(outcome, CompletionOutcome::Completed(json!({"statusUrl": "http://forms.test/status"})));
    }

    #[tokio::test]
    async fn test_no_applicable_steps_is_complete() {
        let complete_path = format!("/api/v1/submissions/{}/_complete", SUB);
        let mock = MockTransport::new().on(Method::Post, &complete_path, 200, json!({}));
        let (client, mut session) = session(mock).await;
        for step in [STEP_A, STEP_B, STEP_C] {
            session.set_applicable(uuid(step), false);
        }

        assert_eq!(session.state(), SubmissionState::Complete);
        assert_eq!(session.complete().await.unwrap(), CompletionOutcome::Completed(json!({})));
        assert_eq!(client.transport().call_count(Method::Post, &complete_path), 1);
    }

    #[tokio::test]
    async fn test_strict_policy_blocks_jumps() {
        let mock = MockTransport::new()
            .on(Method::Post, &steps_path(), 201, json!({"formStep": step_url(STEP_A), "data": {}}));
        let (_, mut session) = session(mock).await;

        let target = StepRef::Index(2);
        assert!(ProgressionPolicy::Free.allows(&session, &target));
        assert_eq!(ProgressionPolicy::Strict.blocking_step(&session, &target).unwrap().uuid, uuid(STEP_A));

        session.submit_step(StepRef::Index(0), Map::new()).await.unwrap();
        assert_eq!(ProgressionPolicy::Strict.blocking_step(&session, &target).unwrap().uuid, uuid(STEP_B));

        session.set_applicable(uuid(STEP_B), false);
        assert!(ProgressionPolicy::Strict.allows(&session, &target));
    }

    #[tokio::test]
    async fn test_resume_loads_recorded_steps_and_applicability() {
        let mock = MockTransport::new()
            .on(Method::Get, &format!("/api/v1/submissions/{}", SUB), 200, submission_body(false))
            .on(Method::Get, &steps_path(), 200, json!({
                "count": 2, "next": null,
                "results": [
                    {"formStep": step_url(STEP_A), "data": {"v": 1}},
                    {"formStep": step_url(STEP_A), "data": {"v": 2}}
                ]
            }));
        let client = Arc::new(ResourceClient::with_transport(BASE, mock).unwrap());

        let session = SubmissionSession::resume(client, form(None), uuid(SUB)).await.unwrap();
        assert_eq!(session.recorded_steps().count(), 1);
        assert_eq!(session.recorded_step(uuid(STEP_A)).unwrap().data["v"], 2);
        assert!(!session.is_applicable(uuid(STEP_B)));
        assert_eq!(session.first_incomplete_step().unwrap().uuid, uuid(STEP_C));
    }

    #[tokio::test]
    async fn test_resume_missing_submission_is_loading_error() {
        let client = Arc::new(ResourceClient::with_transport(BASE, MockTransport::new()).unwrap());
        let err = SubmissionSession::resume(client, form(None), uuid(SUB)).await.err().unwrap();
        match err {
            EngineError::BackendLoading { request, response } => {
                assert_eq!(request.path, format!("/api/v1/submissions/{}", SUB));
                assert_eq!(response.status, 404);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_step_uses_current_pointer() {
        let mock = MockTransport::new().on(
            Method::Get,
            &format!("/api/v1/forms/{}/steps/{}", FORM, STEP_B),
            200,
            json!({"uuid": STEP_B, "url": step_url(STEP_B), "index": 1, "configuration": {"components": []}}),
        );
        let client = ResourceClient::with_transport(BASE, mock).unwrap();

        let step = read_step(&client, &form(Some(STEP_B)), None).await.unwrap();
        assert_eq!(step.index, 1);

        let err = read_step(&client, &form(None), Some(StepRef::Index(7))).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownStep(_)));
    }

    #[tokio::test]
    async fn test_read_step_without_pointer_defaults_to_first() {
        let mock = MockTransport::new().on(
            Method::Get,
            &format!("/api/v1/forms/{}/steps/{}", FORM, STEP_A),
            200,
            json!({"uuid": STEP_A, "url": step_url(STEP_A), "index": 0}),
        );
        let client = ResourceClient::with_transport(BASE, mock).unwrap();
        let step = read_step(&client, &form(None), None).await.unwrap();
        assert_eq!(step.uuid(), uuid(STEP_A));
    }
}
