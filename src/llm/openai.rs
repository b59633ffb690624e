use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, ProviderRequest};
use crate::error::{RagError, Result};
use crate::http;

const PROVIDER: &str = "openai";

/// Default chat model used for synthesis.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You answer user questions using only the provided context. If the context does not contain the answer, say you don't know.";

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    model: String,
    endpoint: String,
    client: Client,
}

impl OpenAiProvider {
    /// Builds a client for `{base_url}/chat/completions`.
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        http::require_key(PROVIDER, api_key)?;
        let auth = format!("Bearer {}", api_key.trim());
        let client = http::build_client(PROVIDER, timeout, &[(AUTHORIZATION, auth.as_str())])?;
        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            client,
        })
    }
}

impl LlmProvider for OpenAiProvider {
    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };
        let parsed: ChatResponse =
            http::send_json(PROVIDER, self.client.post(&self.endpoint).json(&body))?;
        parsed.into_answer()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_answer(self) -> Result<String> {
        self.choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty())
            .ok_or_else(|| RagError::InvalidResponse {
                provider: PROVIDER,
                detail: "chat completion contained no text".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
