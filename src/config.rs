//! Pipeline settings and the command-line surface that produces them.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::document::{IndexDescriptor, Metric};
use crate::error::{RagError, Result};
use crate::indexer::DEFAULT_BATCH_SIZE;
use crate::provisioner::ReadinessPolicy;
use crate::retriever::DEFAULT_TOP_K;
use crate::retry::RetryPolicy;
use crate::synthesizer::{Synthesizer, DEFAULT_MAX_CONTEXT_CHARS};

/// Dimension of `text-embedding-ada-002` vectors.
pub const DEFAULT_DIMENSION: usize = 1536;

/// Everything a [`crate::Pipeline`] needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Target index name.
    pub index_name: String,
    /// Embedding dimension of the index.
    pub dimension: usize,
    /// Similarity metric of the index.
    pub metric: Metric,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Vectors per upsert call.
    pub batch_size: usize,
    /// Matches retrieved per question.
    pub top_k: usize,
    /// Documents indexed concurrently.
    pub workers: usize,
    /// Per-request timeout handed to HTTP clients.
    pub request_timeout: Duration,
    /// Retry budget for every provider call.
    pub retry: RetryPolicy,
    /// Index readiness wait.
    pub readiness: ReadinessPolicy,
    /// Prompt context cap in characters; `None` disables it.
    pub max_context_chars: Option<usize>,
    /// Sampling temperature for answers.
    pub temperature: f32,
    /// Completion token budget for answers.
    pub max_completion_tokens: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_name: "docrag".to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: Metric::Cosine,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            workers: 1,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            readiness: ReadinessPolicy::default(),
            max_context_chars: Some(DEFAULT_MAX_CONTEXT_CHARS),
            temperature: 0.0,
            max_completion_tokens: 512,
        }
    }
}

impl PipelineConfig {
    /// Index shape derived from the settings.
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            name: self.index_name.clone(),
            dimension: self.dimension,
            metric: self.metric,
        }
    }

    /// Answer-generation settings derived from the config.
    pub fn synthesizer(&self) -> Synthesizer {
        Synthesizer {
            max_context_chars: self.max_context_chars,
            temperature: self.temperature,
            max_tokens: self.max_completion_tokens,
        }
    }

    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.index_name.trim().is_empty() {
            return Err(RagError::config("index name must not be empty"));
        }
        let positive = [
            ("dimension", self.dimension),
            ("chunk size", self.chunk_size),
            ("batch size", self.batch_size),
            ("top_k", self.top_k),
            ("workers", self.workers),
            ("retry attempts", self.retry.max_attempts),
            ("max completion tokens", self.max_completion_tokens),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(RagError::config(format!("{name} must be positive")));
        }
        if self.max_context_chars == Some(0) {
            return Err(RagError::config("max context chars must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(RagError::config("request timeout must be positive"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::config("temperature must be between 0 and 2"));
        }
        Ok(())
    }
}

/// Vector store backends selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    /// Hosted Pinecone index.
    Pinecone,
    /// Process-local store; vectors vanish on exit.
    Memory,
}

/// Generative providers selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmKind {
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

/// Command-line interface of the `docrag` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "docrag", about = "Index a folder of documents and answer a question over it")]
pub struct Cli {
    /// Question to answer
    pub question: String,

    /// Directory of documents to index
    #[arg(long, env = "DOCRAG_DOCS", default_value = "docs")]
    pub docs: PathBuf,

    /// File extensions to load, comma separated
    #[arg(long, env = "DOCRAG_EXTENSIONS", default_value = "txt,md,pdf")]
    pub extensions: String,

    /// Skip indexing and query the existing index
    #[arg(long, env = "DOCRAG_SKIP_INDEX", default_value_t = false)]
    pub skip_index: bool,

    /// Target index name
    #[arg(long, env = "DOCRAG_INDEX", default_value = "docrag")]
    pub index: String,

    /// Embedding dimension of the index
    #[arg(long, env = "DOCRAG_DIMENSION", default_value_t = DEFAULT_DIMENSION)]
    pub dimension: usize,

    /// Similarity metric of the index
    #[arg(long, env = "DOCRAG_METRIC", value_enum, default_value = "cosine")]
    pub metric: Metric,

    /// Maximum chunk length in characters
    #[arg(long, env = "DOCRAG_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Vectors per upsert call
    #[arg(long, env = "DOCRAG_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Matches retrieved per question
    #[arg(long, env = "DOCRAG_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Documents indexed concurrently
    #[arg(long, env = "DOCRAG_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "DOCRAG_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per provider call, including the first
    #[arg(long, env = "DOCRAG_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: usize,

    /// Milliseconds before the first retry
    #[arg(long, env = "DOCRAG_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Seconds to wait for a new index to become ready
    #[arg(long, env = "DOCRAG_READY_TIMEOUT_SECS", default_value_t = 120)]
    pub ready_timeout_secs: u64,

    /// Prompt context cap in characters (0 = unlimited)
    #[arg(long, env = "DOCRAG_MAX_CONTEXT_CHARS", default_value_t = DEFAULT_MAX_CONTEXT_CHARS)]
    pub max_context_chars: usize,

    /// Sampling temperature for answers
    #[arg(long, env = "DOCRAG_TEMPERATURE", default_value_t = 0.0)]
    pub temperature: f32,

    /// Completion token budget for answers
    #[arg(long, env = "DOCRAG_MAX_TOKENS", default_value_t = 512)]
    pub max_tokens: usize,

    /// Vector store backend
    #[arg(long, env = "DOCRAG_STORE", value_enum, default_value = "pinecone")]
    pub store: StoreKind,

    /// Generative provider
    #[arg(long, env = "DOCRAG_LLM", value_enum, default_value = "openai")]
    pub llm: LlmKind,

    /// Embedding model name
    #[arg(long, env = "DOCRAG_EMBEDDING_MODEL", default_value = crate::embedder::openai::DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Chat model name (provider default when omitted)
    #[arg(long, env = "DOCRAG_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = crate::embedder::openai::DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic API base URL
    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = crate::llm::DEFAULT_ANTHROPIC_BASE_URL)]
    pub anthropic_base_url: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Pinecone control-plane URL
    #[arg(long, env = "DOCRAG_PINECONE_URL", default_value = crate::store::pinecone::DEFAULT_CONTROL_URL)]
    pub pinecone_url: String,

    /// Pinecone namespace
    #[arg(long, env = "DOCRAG_NAMESPACE")]
    pub namespace: Option<String>,

    /// Cloud for new serverless indexes
    #[arg(long, env = "DOCRAG_CLOUD", default_value = "aws")]
    pub cloud: String,

    /// Region for new serverless indexes
    #[arg(long, env = "DOCRAG_REGION", default_value = "us-east-1")]
    pub region: String,
}

impl Cli {
    /// Converts the parsed CLI into a validated [`PipelineConfig`].
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            index_name: self.index.trim().to_string(),
            dimension: self.dimension,
            metric: self.metric,
            chunk_size: self.chunk_size,
            batch_size: self.batch_size,
            top_k: self.top_k,
            workers: self.workers,
            request_timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.retry_base_ms),
                ..defaults.retry
            },
            readiness: ReadinessPolicy {
                timeout: Duration::from_secs(self.ready_timeout_secs),
                ..defaults.readiness
            },
            max_context_chars: (self.max_context_chars > 0).then_some(self.max_context_chars),
            temperature: self.temperature,
            max_completion_tokens: self.max_tokens,
        };
        config.validate()?;
        Ok(config)
    }

    /// Extensions to load, lower-cased and without leading dots.
    pub fn extension_list(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["docrag"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.descriptor().dimension, 1536);
        assert_eq!(config.synthesizer().max_context_chars, Some(12_000));
    }

    #[test]
    fn validation_rejects_zero_sizes() {
        for mutate in [
            (|c: &mut PipelineConfig| c.chunk_size = 0) as fn(&mut PipelineConfig),
            |c| c.batch_size = 0,
            |c| c.top_k = 0,
            |c| c.index_name = " ".into(),
            |c| c.max_context_chars = Some(0),
        ] {
            let mut config = PipelineConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(RagError::Configuration(_))));
        }
    }

    #[test]
    fn cli_flags_map_onto_config() {
        let cli = parse(&[
            "what is it?",
            "--index",
            "notes",
            "--metric",
            "dotproduct",
            "--chunk-size",
            "500",
            "--max-context-chars",
            "0",
            "--max-attempts",
            "2",
        ]);
        let config = cli.build_config().unwrap();
        assert_eq!(cli.question, "what is it?");
        assert_eq!(config.index_name, "notes");
        assert_eq!(config.metric, Metric::DotProduct);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.max_context_chars, None);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_delay, RetryPolicy::default().max_delay);
    }

    #[test]
    fn invalid_cli_values_fail_conversion() {
        let cli = parse(&["q", "--batch-size", "0"]);
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn extension_list_is_normalised() {
        let cli = parse(&["q", "--extensions", " .MD, txt,,"]);
        assert_eq!(cli.extension_list(), vec!["md", "txt"]);
    }
}
