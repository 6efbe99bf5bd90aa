//! Registration backend discovery endpoints
//!
//! Option lists for the case-management (ZGW) and object-store (Objects
//! API) backends, plus the [`OptionSource`]s that feed them into a
//! [`Cascade`].

use crate::cascade::{Cascade, LevelSpec, OptionOrdering, OptionRecord, OptionSource};
use crate::error::{EngineError, RequestSpec, Result};
use async_trait::async_trait;
use formflow_client::{ResourceClient, Transport};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const ZGW_BASE: &str = "/api/v2/registration/plugins/zgw-api";
const OBJECTS_BASE: &str = "/api/v2/registration/plugins/objects-api";

/// Typed access to the discovery endpoints
pub struct Discovery<T: Transport> {
    client: Arc<ResourceClient<T>>,
}

impl<T: Transport> Clone for Discovery<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: Transport> Discovery<T> {
    pub fn new(client: Arc<ResourceClient<T>>) -> Self {
        Self { client }
    }

    /// Catalogues available through a ZGW API group
    pub async fn catalogues(&self, group: &str) -> Result<Vec<OptionRecord>> {
        self.fetch_options(
            RequestSpec::new(format!("{}/catalogues", ZGW_BASE), &[("zgw_api_group", group)]),
            "url",
            &["label", "domain"],
        )
        .await
    }

    /// Case types within a catalogue
    pub async fn case_types(&self, group: &str, catalogue_url: &str) -> Result<Vec<OptionRecord>> {
        self.fetch_options(
            RequestSpec::new(
                format!("{}/case-types", ZGW_BASE),
                &[("zgw_api_group", group), ("catalogue_url", catalogue_url)],
            ),
            "identification",
            &["description"],
        )
        .await
    }

    /// Document types, optionally narrowed to one case type
    pub async fn document_types(
        &self,
        group: &str,
        catalogue_url: &str,
        case_type: Option<&str>,
    ) -> Result<Vec<OptionRecord>> {
        let mut query = vec![("zgw_api_group", group), ("catalogue_url", catalogue_url)];
        if let Some(case_type) = case_type {
            query.push(("case_type_identification", case_type));
        }
        self.fetch_options(
            RequestSpec::new(format!("{}/document-types", ZGW_BASE), &query),
            "url",
            &["description"],
        )
        .await
    }

    /// Object types known to an Objects API group
    pub async fn object_types(&self, group: &str) -> Result<Vec<OptionRecord>> {
        self.fetch_options(
            RequestSpec::new(format!("{}/object-types", OBJECTS_BASE), &[("objects_api_group", group)]),
            "url",
            &["name"],
        )
        .await
    }

    /// Published versions of one object type
    pub async fn object_type_versions(&self, group: &str, object_type_uuid: &str) -> Result<Vec<OptionRecord>> {
        self.fetch_options(
            RequestSpec::new(
                format!("{}/object-types/{}/versions", OBJECTS_BASE, object_type_uuid),
                &[("objects_api_group", group)],
            ),
            "version",
            &["status"],
        )
        .await
    }

    /// Fetch a list endpoint and project each record to an option
    pub async fn fetch_options(
        &self,
        request: RequestSpec,
        value_field: &str,
        label_fields: &[&str],
    ) -> Result<Vec<OptionRecord>> {
        let response = self.client.list(&request.path, &request.query_pairs()).await?;
        if !response.ok {
            return Err(EngineError::loading(request, response));
        }

        let records = response
            .data
            .as_array()
            .ok_or_else(|| EngineError::Hydration(format!("{} did not return a list", request)))?;
        let options: Vec<OptionRecord> = records
            .iter()
            .filter_map(|record| {
                let value = scalar(record.get(value_field)?)?;
                let label = label_fields
                    .iter()
                    .find_map(|field| record.get(*field).and_then(scalar).filter(|s| !s.is_empty()))
                    .unwrap_or_else(|| value.clone());
                Some(OptionRecord { value, label })
            })
            .collect();

        debug!(request = %request, count = options.len(), "options loaded");
        Ok(options)
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Levels: API group → catalogue → case type → document type
pub fn zgw_cascade() -> Cascade {
    Cascade::new(vec![
        LevelSpec::new("zgw api group").auto_select(),
        LevelSpec::new("catalogue").ordered(OptionOrdering::ByLabel),
        LevelSpec::new("case type").ordered(OptionOrdering::ByLabel),
        LevelSpec::new("document type").ordered(OptionOrdering::ByLabel),
    ])
}

/// Levels: API group → object type → object type version
pub fn objects_api_cascade() -> Cascade {
    Cascade::new(vec![
        LevelSpec::new("objects api group").auto_select(),
        LevelSpec::new("object type"),
        LevelSpec::new("object type version").auto_select(),
    ])
}

/// Feeds [`zgw_cascade`]
pub struct ZgwOptionSource<T: Transport> {
    discovery: Discovery<T>,
    groups: Vec<OptionRecord>,
}

impl<T: Transport> ZgwOptionSource<T> {
    /// `groups` are the configured API groups, offered at the root level
    pub fn new(discovery: Discovery<T>, groups: Vec<OptionRecord>) -> Self {
        Self { discovery, groups }
    }
}

#[async_trait]
impl<T: Transport> OptionSource for ZgwOptionSource<T> {
    async fn load(&self, level: usize, parents: &[String]) -> Result<Vec<OptionRecord>> {
        match (level, parents) {
            (0, _) => Ok(self.groups.clone()),
            (1, [group]) => self.discovery.catalogues(group).await,
            (2, [group, catalogue]) => self.discovery.case_types(group, catalogue).await,
            (3, [group, catalogue, case_type]) => {
                self.discovery.document_types(group, catalogue, Some(case_type)).await
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Feeds [`objects_api_cascade`]
pub struct ObjectsApiOptionSource<T: Transport> {
    discovery: Discovery<T>,
    groups: Vec<OptionRecord>,
}

impl<T: Transport> ObjectsApiOptionSource<T> {
    pub fn new(discovery: Discovery<T>, groups: Vec<OptionRecord>) -> Self {
        Self { discovery, groups }
    }
}

#[async_trait]
impl<T: Transport> OptionSource for ObjectsApiOptionSource<T> {
    async fn load(&self, level: usize, parents: &[String]) -> Result<Vec<OptionRecord>> {
        match (level, parents) {
            (0, _) => Ok(self.groups.clone()),
            (1, [group]) => self.discovery.object_types(group).await,
            (2, [group, object_type_url]) => {
                // versions are addressed by the object type's uuid, the last URL segment
                let uuid = object_type_url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
                self.discovery.object_type_versions(group, uuid).await
            }
            _ => Ok(Vec::new()),
        }
    }
}
