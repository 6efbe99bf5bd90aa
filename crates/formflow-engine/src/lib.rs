//! Formflow engine
//!
//! Client-side logic for multi-step, resumable form submissions and for
//! mapping form variables onto registration backend schemas.
//!
//! # Modules
//!
//! - [`progression`]: submission sessions, step reads and writes, completion
//! - [`mapping`]: target path discovery and variable-to-path mappings
//! - [`cascade`]: dependent option lists with stale-response protection
//! - [`walker`]: leaf enumeration and path syntax for JSON values
//!
//! # Example
//!
//! ```rust,no_run
//! use formflow_client::{ClientConfig, EntityResource, ResourceClient};
//! use formflow_engine::models::{Form, StepRef};
//! use formflow_engine::progression::{StepOutcome, SubmissionSession};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(ResourceClient::new(ClientConfig::default().with_env_overrides())?);
//! let form: Form = EntityResource::new(&*client, &[])?.read("contact").await?;
//!
//! let mut session = SubmissionSession::create(Arc::clone(&client), form).await?;
//! let data = json!({"email": "ada@example.com"}).as_object().cloned().unwrap_or_default();
//! match session.submit_step(StepRef::Index(0), data).await? {
//!     StepOutcome::Saved(step) => println!("saved {:?}", step.id()),
//!     StepOutcome::Rejected(errors) => {
//!         for error in &errors.errors {
//!             println!("{}: {}", error.path, error.message);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod mapping;
pub mod models;
pub mod progression;
pub mod walker;

pub use cascade::{Cascade, FetchTicket, LevelSpec, LevelStatus, OptionOrdering, OptionRecord, OptionSource, Resolution};
pub use discovery::{objects_api_cascade, zgw_cascade, Discovery, ObjectsApiOptionSource, ZgwOptionSource};
pub use error::{EngineError, FieldError, MappingViolation, RequestSpec, Result, ValidationErrors};
pub use keys::KeyGenerator;
pub use mapping::{
    compatible_target_paths, fetch_target_paths, propagate_variable_edit, resolve_target_paths, save_mapping,
    MappingSet, RegistrationBackend, TargetPathDescriptor, Variable, VariableMapping,
};
pub use models::{Form, FormStep, FormStepSummary, StepRef, Submission, SubmissionStep};
pub use progression::{
    read_step, CompletionOutcome, ProgressionPolicy, StepOutcome, SubmissionSession, SubmissionState,
};
pub use walker::{find_by_key, format_path, lookup, parse_path, walk, PathEntry, Segment};
