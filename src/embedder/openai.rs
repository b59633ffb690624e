//! OpenAI-based embedding client implementation.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::document::Embedding;
use crate::error::{RagError, Result};
use crate::http;

const PROVIDER: &str = "openai";

/// Default model, producing 1536-dimensional vectors.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default base URL for OpenAI-compatible endpoints.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Blocking embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_inputs_per_request: usize,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    ///
    /// Batches larger than `max_inputs_per_request` are sent as several
    /// requests and stitched back together in order.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
        max_inputs_per_request: usize,
    ) -> Result<Self> {
        http::require_key(PROVIDER, api_key)?;
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RagError::config("missing OpenAI embedding model name"));
        }
        let auth = format!("Bearer {}", api_key.trim());
        let client = http::build_client(PROVIDER, timeout, &[(AUTHORIZATION, auth.as_str())])?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            max_inputs_per_request: max_inputs_per_request.max(1),
        })
    }

    /// Maximum inputs sent in one HTTP request.
    pub fn max_inputs_per_request(&self) -> usize {
        self.max_inputs_per_request
    }

    fn embed_request(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        debug!(inputs = inputs.len(), model = %self.model, "requesting embeddings");
        let parsed: EmbeddingResponse =
            http::send_json(PROVIDER, self.client.post(&self.endpoint).json(&request))?;
        parsed.into_embeddings(inputs.len())
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(inputs.len());
        for slice in inputs.chunks(self.max_inputs_per_request) {
            out.extend(self.embed_request(slice)?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    fn into_embeddings(mut self, expected_len: usize) -> Result<Vec<Embedding>> {
        if self.data.len() != expected_len {
            return Err(RagError::InvalidResponse {
                provider: PROVIDER,
                detail: format!(
                    "returned {} embeddings for {} inputs",
                    self.data.len(),
                    expected_len
                ),
            });
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
