//! Rust client for form, submission and registration-discovery APIs
//!
//! # Example
//!
//! ```rust,no_run
//! use formflow_client::{ClientConfig, ResourceClient};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ResourceClient::new(ClientConfig {
//!     base_url: "https://forms.example.com".into(),
//!     api_key: Some("secret".into()),
//!     ..Default::default()
//! })?;
//!
//! // Reads report HTTP failures in the envelope
//! let form = client.get("/api/v1/forms/my-form", &[]).await?;
//! if !form.ok {
//!     eprintln!("lookup failed with {}: {}", form.status, form.data);
//! }
//!
//! // Writes surface them as `ClientError::Response`
//! let submission = client
//!     .create("/api/v1/submissions", &json!({"form": "https://forms.example.com/api/v1/forms/my-form"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod mock;
pub mod response;
pub mod transport;

// Re-export main types
pub use client::ResourceClient;
pub use config::ClientConfig;
pub use entity::{expand_template, Entity, EntityDescriptor, EntityResource};
pub use error::{ClientError, Result};
pub use mock::MockTransport;
pub use response::ApiResponse;
pub use transport::{HttpRequest, HttpTransport, Method, RawResponse, Transport};
