// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store interface and its Weaviate REST implementation.
//!
//! The store is treated as an opaque service: it owns one collection, embeds
//! text server-side and answers nearest-neighbour queries with distances.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RemoteConfig;
use crate::corpus::Module;
use crate::errors::ModsimError;

/// Text properties stored for every module.
pub const MODULE_PROPERTIES: [&str; 4] = ["module_id", "title", "content", "learning_outcomes"];

/// Shape of the module collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub vectorizer: String,
    pub properties: Vec<String>,
}

impl CollectionSchema {
    /// The fixed four-text-field module schema.
    pub fn modules(vectorizer: impl Into<String>) -> Self {
        Self {
            vectorizer: vectorizer.into(),
            properties: MODULE_PROPERTIES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// An object returned by a plain fetch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

/// Outcome of one import request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub errors: Vec<String>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearTextHit {
    pub module_id: String,
    pub title: String,
    /// Raw store distance; smaller is closer.
    pub distance: f32,
}

/// Operations the pipeline needs from a vector store bound to one collection.
pub trait VectorStore {
    /// Name of the collection this store operates on.
    fn collection(&self) -> &str;

    fn collection_exists(&self) -> Result<bool>;

    fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    fn delete_collection(&self) -> Result<()>;

    /// Up to `limit` stored objects, in no particular order.
    fn fetch_objects(&self, limit: usize) -> Result<Vec<StoredObject>>;

    fn insert_objects(&self, modules: &[Module]) -> Result<BatchReport>;

    /// Objects closest to `query`, nearest first.
    fn near_text(&self, query: &str, limit: usize) -> Result<Vec<NearTextHit>>;
}

/// Blocking Weaviate client bound to one collection.
///
/// Created with [`WeaviateClient::connect`], which fails unless the server
/// reports ready. The connection is released when the client is dropped.
pub struct WeaviateClient {
    http: Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl WeaviateClient {
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let collection = config.collection().to_string();
        validate_collection_name(&collection)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs()))
            .build()
            .context("Failed to build HTTP client")?;

        let client = Self {
            http,
            base_url: config.url().trim_end_matches('/').to_string(),
            collection,
            api_key: config.api_key(),
        };

        let response = client
            .request(Method::GET, "/v1/.well-known/ready")
            .send()
            .map_err(|err| {
                ModsimError::SchemaSetup(format!("cannot reach {}: {err}", client.base_url))
            })?;
        if !response.status().is_success() {
            return Err(ModsimError::SchemaSetup(format!(
                "{} is not ready (status {})",
                client.base_url,
                response.status()
            ))
            .into());
        }

        info!("Connected to vector store at {}", client.base_url);
        Ok(client)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .map_err(|err| ModsimError::Store(err.to_string()).into())
    }
}

impl Drop for WeaviateClient {
    fn drop(&mut self) {
        debug!("Closed vector store connection to {}", self.base_url);
    }
}

impl VectorStore for WeaviateClient {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_exists(&self) -> Result<bool> {
        let path = format!("/v1/schema/{}", self.collection);
        let response = self.send(self.request(Method::GET, &path))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(status_error(status, response)),
        }
    }

    fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let properties: Vec<Value> = schema
            .properties
            .iter()
            .map(|name| json!({ "name": name, "dataType": ["text"] }))
            .collect();
        let body = json!({
            "class": self.collection,
            "vectorizer": schema.vectorizer,
            "properties": properties,
        });

        let response = self.send(self.request(Method::POST, "/v1/schema").json(&body))?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), response));
        }
        info!("Created collection {}", self.collection);
        Ok(())
    }

    fn delete_collection(&self) -> Result<()> {
        let path = format!("/v1/schema/{}", self.collection);
        let response = self.send(self.request(Method::DELETE, &path))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => {
                info!("Deleted collection {}", self.collection);
                Ok(())
            }
            status => Err(status_error(status, response)),
        }
    }

    fn fetch_objects(&self, limit: usize) -> Result<Vec<StoredObject>> {
        let path = format!("/v1/objects?class={}&limit={}", self.collection, limit);
        let response = self.send(self.request(Method::GET, &path))?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), response));
        }

        #[derive(Deserialize)]
        struct ObjectList {
            #[serde(default)]
            objects: Option<Vec<StoredObject>>,
        }

        let list: ObjectList = response
            .json()
            .map_err(|err| ModsimError::Store(format!("invalid object list: {err}")))?;
        Ok(list.objects.unwrap_or_default())
    }

    fn insert_objects(&self, modules: &[Module]) -> Result<BatchReport> {
        if modules.is_empty() {
            return Ok(BatchReport::default());
        }

        let objects: Vec<Value> = modules
            .iter()
            .map(|m| json!({ "class": self.collection, "properties": m }))
            .collect();
        let body = json!({ "objects": objects });

        let response = self.send(self.request(Method::POST, "/v1/batch/objects").json(&body))?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), response));
        }
        let results: Vec<Value> = response
            .json()
            .map_err(|err| ModsimError::Store(format!("invalid batch response: {err}")))?;

        Ok(batch_report(&results))
    }

    fn near_text(&self, query: &str, limit: usize) -> Result<Vec<NearTextHit>> {
        let concept = serde_json::to_string(query)?;
        let graphql = format!(
            "{{ Get {{ {}(nearText: {{concepts: [{}]}}, limit: {}) {{ module_id title _additional {{ distance }} }} }} }}",
            self.collection, concept, limit
        );

        let response = self.send(
            self.request(Method::POST, "/v1/graphql")
                .json(&json!({ "query": graphql })),
        )?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), response));
        }
        let body: Value = response
            .json()
            .map_err(|err| ModsimError::Store(format!("invalid query response: {err}")))?;

        parse_near_text(&body, &self.collection)
    }
}

fn status_error(status: StatusCode, response: Response) -> anyhow::Error {
    let text = response.text().unwrap_or_default();
    ModsimError::Store(format!("status {status}: {}", text.trim())).into()
}

/// Collection names end up in URL paths and GraphQL, so keep them to identifiers.
fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ModsimError::SchemaSetup(format!("invalid collection name '{name}'")).into())
    }
}

fn batch_report(results: &[Value]) -> BatchReport {
    let mut report = BatchReport::default();
    for result in results {
        let errors = result
            .pointer("/result/errors/error")
            .and_then(Value::as_array)
            .filter(|errors| !errors.is_empty());
        match errors {
            Some(errors) => {
                for error in errors {
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    report.errors.push(message.to_string());
                }
            }
            None => report.inserted += 1,
        }
    }
    report
}

fn parse_near_text(body: &Value, collection: &str) -> Result<Vec<NearTextHit>> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(ModsimError::Store(messages.join("; ")).into());
        }
    }

    let hits = body
        .get("data")
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(collection))
        .and_then(Value::as_array)
        .ok_or_else(|| ModsimError::Store("query response has no results array".to_string()))?;

    hits.iter()
        .map(|hit| -> Result<NearTextHit> {
            let field = |name: &str| {
                hit.get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ModsimError::Store(format!("hit without '{name}'")))
            };
            let distance = hit
                .pointer("/_additional/distance")
                .and_then(Value::as_f64)
                .ok_or_else(|| ModsimError::Store("hit without distance".to_string()))?;
            Ok(NearTextHit {
                module_id: field("module_id")?,
                title: field("title")?,
                distance: distance as f32,
            })
        })
        .collect()
}
