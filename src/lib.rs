#![warn(missing_docs)]
//! Retrieval-augmented question answering over a folder of documents.
//!
//! Documents are split into bounded chunks, embedded, and upserted into a
//! vector index; a question is embedded the same way, its nearest chunks are
//! retrieved, and a generative provider answers from that context.

pub mod chunker;
pub mod config;
pub mod document;
pub mod embedder;
pub mod error;
mod http;
pub mod indexer;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod provisioner;
pub mod retriever;
pub mod retry;
pub mod store;
pub mod synthesizer;

pub use chunker::{chunk_document, split, Chunks, DEFAULT_CHUNK_SIZE};
pub use config::{Cli, LlmKind, PipelineConfig, StoreKind};
pub use document::{
    Chunk, ChunkMetadata, Document, Embedding, IndexDescriptor, IndexStatus, IndexedVector,
    LineRange, Metric, QueryMatch,
};
pub use embedder::{Embedder, OpenAiEmbedder};
pub use error::{RagError, Result};
pub use indexer::{DocumentReport, Indexer, IndexingFailure, IndexingReport, Stage};
pub use llm::{AnthropicProvider, LlmProvider, OpenAiProvider, ProviderRequest};
pub use loader::load_directory;
pub use pipeline::Pipeline;
pub use provisioner::{ensure_index, Provisioned, ReadinessPolicy};
pub use retriever::retrieve;
pub use retry::{RetryPolicy, Retrying};
pub use store::{MemoryStore, PineconeStore, VectorStore};
pub use synthesizer::{Answer, Synthesizer, NO_CONTEXT_ANSWER};
