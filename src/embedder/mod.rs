//! Embedding clients that turn text into fixed-length vectors.

use crate::document::Embedding;
use crate::error::{RagError, Result};

pub mod openai;

pub use openai::OpenAiEmbedder;

/// Converts text into embedding vectors.
///
/// Implementations return exactly one vector per input, in input order.
/// Inputs are embedded as given; callers normalise whitespace beforehand.
pub trait Embedder: Send + Sync {
    /// Embeds a batch of strings.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>>;

    /// Embeds a single string.
    fn embed_one(&self, input: &str) -> Result<Embedding> {
        self.embed_batch(&[input])?
            .pop()
            .ok_or_else(|| RagError::InvalidResponse {
                provider: "embedder",
                detail: "no embedding returned for query".to_string(),
            })
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(inputs)
    }

    fn embed_one(&self, input: &str) -> Result<Embedding> {
        (**self).embed_one(input)
    }
}
