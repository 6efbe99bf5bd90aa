//! Typed entities over the generic resource client
//!
//! An entity type describes itself once through an [`EntityDescriptor`]
//! (collection URL template plus field rules); [`EntityResource`] then gives
//! read/list/create for any entity without per-entity client code.

use crate::client::ResourceClient;
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Static description of an entity's endpoint and field rules
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Human-readable name, used in logs
    pub name: &'static str,
    /// Collection URL template, e.g. `/api/v1/forms/{form}/steps`
    pub collection: &'static str,
    /// Server-assigned identity fields, never written back
    pub read_only: &'static [&'static str],
    /// Client-side fields (attached child handles, caches), never written back
    pub local_only: &'static [&'static str],
}

/// A typed remote entity
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const DESCRIPTOR: EntityDescriptor;

    /// Wrap raw JSON into a typed instance
    fn hydrate(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize for a write, without read-only or local-only fields
    fn to_wire(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            for field in Self::DESCRIPTOR.read_only.iter().chain(Self::DESCRIPTOR.local_only) {
                map.remove(*field);
            }
        }
        Ok(value)
    }
}

/// Expand `{name}` placeholders in a URL template
pub fn expand_template(template: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| ClientError::MissingParam {
            template: template.to_string(),
            param: after.to_string(),
        })?;
        let name = &after[..end];
        let value = params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| ClientError::MissingParam {
                template: template.to_string(),
                param: name.to_string(),
            })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Typed access to one entity collection
pub struct EntityResource<'a, E, T> {
    client: &'a ResourceClient<T>,
    collection: String,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity, T: Transport> EntityResource<'a, E, T> {
    /// Bind the collection template of `E` with the given parameters
    pub fn new(client: &'a ResourceClient<T>, params: &[(&str, &str)]) -> Result<Self> {
        Ok(Self {
            client,
            collection: expand_template(E::DESCRIPTOR.collection, params)?,
            _entity: PhantomData,
        })
    }

    pub fn collection_path(&self) -> &str {
        &self.collection
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection.trim_end_matches('/'), id)
    }

    /// Read one entity by id
    pub async fn read(&self, id: &str) -> Result<E> {
        let data = self.client.get(&self.item_path(id), &[]).await?.into_result()?;
        E::hydrate(data)
    }

    /// Read an entity by absolute URL (as found in references)
    pub async fn read_url(&self, url: &str) -> Result<E> {
        let data = self.client.get(url, &[]).await?.into_result()?;
        E::hydrate(data)
    }

    /// Read the whole collection, pagination included
    pub async fn list(&self) -> Result<Vec<E>> {
        let data = self.client.list(&self.collection, &[]).await?.into_result()?;
        match data {
            Value::Array(items) => items.into_iter().map(E::hydrate).collect(),
            other => Err(ClientError::transport(
                self.collection.clone(),
                format!("expected a list of {}, got {}", E::DESCRIPTOR.name, kind(&other)),
            )),
        }
    }

    /// Create an entity from a wire body
    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<E> {
        let data = self.client.create(&self.collection, body).await?;
        E::hydrate(data)
    }

    /// Create an entity from a local instance
    pub async fn create_from(&self, entity: &E) -> Result<E> {
        self.create(&entity.to_wire()?).await
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
