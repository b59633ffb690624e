//! Generative providers used to synthesise answers.

use crate::error::Result;

mod anthropic;
mod openai;

pub use anthropic::{AnthropicProvider, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_ANTHROPIC_MODEL};
pub use openai::{OpenAiProvider, DEFAULT_CHAT_MODEL};

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider: Send + Sync {
    /// Returns the completion text for `request`.
    fn answer(&self, request: &ProviderRequest) -> Result<String>;
}

impl<T: LlmProvider + ?Sized> LlmProvider for Box<T> {
    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        (**self).answer(request)
    }
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Fully rendered prompt.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: usize,
}
