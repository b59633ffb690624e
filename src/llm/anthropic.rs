use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, ProviderRequest};
use crate::error::{RagError, Result};
use crate::http;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Default base URL of the Anthropic API.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Default Anthropic model identifier.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Anthropic messages API client.
pub struct AnthropicProvider {
    model: String,
    endpoint: String,
    client: Client,
}

impl AnthropicProvider {
    /// Builds a client for `{base_url}/messages` with the API key and version headers preset.
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        http::require_key(PROVIDER, api_key)?;
        let client = http::build_client(
            PROVIDER,
            timeout,
            &[
                (HeaderName::from_static("x-api-key"), api_key),
                (HeaderName::from_static("anthropic-version"), API_VERSION),
            ],
        )?;
        Ok(Self {
            model,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            client,
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: request.prompt,
                }],
            }],
        };
        let parsed: AnthropicResponse =
            http::send_json(PROVIDER, self.client.post(&self.endpoint).json(&body))?;
        parsed.into_answer()
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

impl AnthropicResponse {
    fn into_answer(self) -> Result<String> {
        let answer = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.trim().is_empty() {
            return Err(RagError::InvalidResponse {
                provider: PROVIDER,
                detail: "response missing text content".to_string(),
            });
        }
        Ok(answer)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
