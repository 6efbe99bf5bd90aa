//! Generic resource client

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::response::ApiResponse;
use crate::transport::{HttpRequest, HttpTransport, Method, Transport};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Uniform access to remote collection-of-entity endpoints
///
/// Reads never fail on HTTP-level errors: they return an [`ApiResponse`]
/// with `ok == false`. Only transport faults are `Err`. Writes return the
/// created representation, or `ClientError::Response` carrying the
/// original response.
///
/// # Example
///
/// ```rust,no_run
/// use formflow_client::{ClientConfig, ResourceClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ResourceClient::new(ClientConfig {
///     base_url: "https://forms.example.com".into(),
///     ..Default::default()
/// })?;
///
/// let forms = client.list("/api/v1/forms/", &[]).await?;
/// if forms.ok {
///     println!("{} forms", forms.data.as_array().map_or(0, |f| f.len()));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResourceClient<T = HttpTransport> {
    base_url: Url,
    transport: T,
}

impl ResourceClient<HttpTransport> {
    /// Create a client backed by reqwest
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(&config.base_url, transport)
    }
}

impl<T: Transport> ResourceClient<T> {
    /// Create a client over any transport
    pub fn with_transport(base_url: &str, transport: T) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // a deployment may live under a sub-path; it must survive joins
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, transport })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve a path or absolute URL against the base URL.
    ///
    /// Root-relative paths (`/api/v1/...`) land under the base URL's own
    /// path, unless they already carry it (as server-issued links do).
    /// Absolute URLs are used as given.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let prefix = self.base_url.path();
        let relative = match path.strip_prefix('/') {
            Some(_) if prefix != "/" && path.starts_with(prefix) => path,
            Some(rest) if !rest.starts_with('/') => rest,
            _ => path,
        };
        Ok(self.base_url.join(relative)?)
    }

    /// Read a single resource
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let mut url = self.resolve(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.send(Method::Get, url, None).await
    }

    /// Read a collection, following pagination to the end.
    ///
    /// A body carrying both `results` and `count` is a page: `next` links
    /// are followed and every page's `results` concatenated in order. Any
    /// other body is returned as-is. If a later page fails, that page's
    /// response is returned instead.
    pub async fn list(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let first = self.get(path, query).await?;
        if !first.ok || !first.is_paginated() {
            return Ok(first);
        }

        let status = first.status;
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut page = first;

        loop {
            let next = next_link(&page.data);
            if let Value::Object(mut body) = page.data {
                if let Some(Value::Array(results)) = body.remove("results") {
                    items.extend(results);
                }
            }

            let Some(next) = next else { break };
            let url = self.resolve(&next)?;
            if !seen.insert(url.clone()) {
                warn!(url = %url, "pagination loop detected, stopping");
                break;
            }

            debug!(url = %url, fetched = items.len(), "following pagination");
            page = self.send(Method::Get, url, None).await?;
            if !page.ok {
                return Ok(page);
            }
        }

        Ok(ApiResponse::new(status, Value::Array(items)))
    }

    /// Create a resource (POST), returning the created representation
    pub async fn create<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.write(Method::Post, path, body).await
    }

    /// Replace a resource (PUT)
    pub async fn update<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.write(Method::Put, path, body).await
    }

    /// Partially update a resource (PATCH)
    pub async fn partial_update<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.write(Method::Patch, path, body).await
    }

    /// Delete a resource
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.resolve(path)?;
        self.send(Method::Delete, url, None).await?.into_result()?;
        Ok(())
    }

    async fn write<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<Value> {
        let url = self.resolve(path)?;
        let body = serde_json::to_value(body)?;
        self.send(method, url, Some(body)).await?.into_result()
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<ApiResponse> {
        let url_str = url.to_string();
        debug!(method = %method, url = %url_str, "sending request");

        let raw = self.transport.send(HttpRequest { method, url, body }).await?;
        let data = parse_body(&raw.body, raw.status, &url_str)?;
        let response = ApiResponse::new(raw.status, data);

        if !response.ok {
            debug!(method = %method, url = %url_str, status = response.status, "request failed");
        }
        Ok(response)
    }
}

fn next_link(data: &Value) -> Option<String> {
    data.get("next")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_body(body: &str, status: u16, url: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => Ok(Value::String(body.to_string())),
        Err(e) => Err(ClientError::transport(url, format!("malformed response body: {}", e))),
    }
}
