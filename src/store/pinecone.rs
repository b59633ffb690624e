//! Pinecone REST client.
//!
//! Index management goes through the control plane; upserts and queries are
//! sent to the per-index data-plane host, resolved once from
//! `describe_index` and cached.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::VectorStore;
use crate::document::{IndexDescriptor, IndexStatus, IndexedVector, Metric, QueryMatch};
use crate::error::{RagError, Result};
use crate::http;

const PROVIDER: &str = "pinecone";
const API_VERSION: &str = "2024-07";

/// Default control-plane endpoint.
pub const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";

/// Where serverless indexes are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerlessSpec {
    /// Cloud provider, e.g. `aws`.
    pub cloud: String,
    /// Cloud region, e.g. `us-east-1`.
    pub region: String,
}

impl Default for ServerlessSpec {
    fn default() -> Self {
        Self {
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Blocking Pinecone client.
pub struct PineconeStore {
    client: Client,
    control_url: String,
    namespace: Option<String>,
    serverless: ServerlessSpec,
    hosts: Mutex<HashMap<String, String>>,
}

impl PineconeStore {
    /// Builds a client authenticated with `api_key`.
    pub fn new(
        api_key: &str,
        control_url: &str,
        namespace: Option<String>,
        serverless: ServerlessSpec,
        timeout: Duration,
    ) -> Result<Self> {
        http::require_key(PROVIDER, api_key)?;
        let client = http::build_client(
            PROVIDER,
            timeout,
            &[
                (HeaderName::from_static("api-key"), api_key),
                (HeaderName::from_static("x-pinecone-api-version"), API_VERSION),
            ],
        )?;
        Ok(Self {
            client,
            control_url: control_url.trim_end_matches('/').to_string(),
            namespace: namespace.filter(|ns| !ns.trim().is_empty()),
            serverless,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    fn data_url(&self, index: &str, path: &str) -> Result<String> {
        let cached = self
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned();
        let host = match cached {
            Some(host) => host,
            None => {
                let model = self.fetch_index(index)?;
                model.host
            }
        };
        if host.is_empty() {
            return Err(RagError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("index '{index}' has no data-plane host yet"),
            });
        }
        Ok(format!("{}{}", with_scheme(&host), path))
    }

    fn fetch_index(&self, name: &str) -> Result<IndexModel> {
        let url = format!("{}/indexes/{}", self.control_url, name);
        let model: IndexModel = http::send_json(PROVIDER, self.client.get(url))?;
        if !model.host.is_empty() {
            self.hosts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), model.host.clone());
        }
        Ok(model)
    }
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

impl VectorStore for PineconeStore {
    fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/indexes", self.control_url);
        let listed: ListIndexesResponse = http::send_json(PROVIDER, self.client.get(url))?;
        Ok(listed.indexes.into_iter().map(|index| index.name).collect())
    }

    fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
        let url = format!("{}/indexes", self.control_url);
        let body = CreateIndexRequest {
            name: &descriptor.name,
            dimension: descriptor.dimension,
            metric: descriptor.metric,
            spec: IndexSpec {
                serverless: &self.serverless,
            },
        };
        match http::send(PROVIDER, self.client.post(url).json(&body)) {
            Ok(_) => Ok(()),
            // Lost a race with another run creating the same index.
            Err(RagError::ProviderRejected { status: 409, .. }) => {
                debug!(index = %descriptor.name, "index already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn describe_index(&self, name: &str) -> Result<IndexStatus> {
        let model = self.fetch_index(name)?;
        Ok(IndexStatus {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
            ready: model.status.ready,
        })
    }

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        let url = self.data_url(index, "/vectors/upsert")?;
        let body = UpsertRequest {
            vectors,
            namespace: self.namespace.as_deref(),
        };
        let resp: UpsertResponse =
            http::send_json(PROVIDER, self.client.post(url).json(&body))?;
        if resp.upserted_count != vectors.len() {
            return Err(RagError::InvalidResponse {
                provider: PROVIDER,
                detail: format!(
                    "upserted {} of {} vectors",
                    resp.upserted_count,
                    vectors.len()
                ),
            });
        }
        Ok(())
    }

    fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let url = self.data_url(index, "/query")?;
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: true,
            namespace: self.namespace.as_deref(),
        };
        let resp: QueryResponse = http::send_json(PROVIDER, self.client.post(url).json(&body))?;
        Ok(resp.matches)
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: &'a ServerlessSpec,
}

#[derive(Debug, Deserialize)]
struct ListIndexesResponse {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    #[serde(default)]
    metric: Option<Metric>,
    #[serde(default)]
    host: String,
    status: IndexModelStatus,
}

#[derive(Debug, Deserialize)]
struct IndexModelStatus {
    ready: bool,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexedVector],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}
