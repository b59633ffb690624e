//! Shared data structures passed between pipeline stages.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed-length embedding vector.
pub type Embedding = Vec<f32>;

/// Raw text loaded from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier of the source (usually a relative path).
    pub source_id: String,
    /// Full text content.
    pub text: String,
}

impl Document {
    /// Creates a document from its parts.
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// 1-based inclusive line range of a chunk within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// First line covered by the chunk.
    pub from: usize,
    /// Last line covered by the chunk.
    pub to: usize,
}

/// Bounded fragment of a document, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `"<source_id>_<ordinal>"`.
    pub id: String,
    /// Owning document.
    pub source_id: String,
    /// Position in the chunker's output order.
    pub ordinal: usize,
    /// Chunk text as it appears in the document.
    pub text: String,
    /// Where the chunk sits in the document.
    pub lines: LineRange,
}

/// Derives the vector-store id for a chunk.
pub fn chunk_id(source_id: &str, ordinal: usize) -> String {
    format!("{source_id}_{ordinal}")
}

/// Flattens line breaks so the embedding model sees one continuous passage.
pub fn normalize_for_embedding(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ")
}

/// Metadata stored next to every vector; enough to rebuild the chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning document.
    pub source_id: String,
    /// Chunk ordinal within the document.
    pub ordinal: usize,
    /// Original chunk text.
    pub text: String,
    /// First line of the chunk.
    pub line_from: usize,
    /// Last line of the chunk.
    pub line_to: usize,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source_id: chunk.source_id.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            line_from: chunk.lines.from,
            line_to: chunk.lines.to,
        }
    }
}

/// Vector record written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    /// Same as [`Chunk::id`].
    pub id: String,
    /// Embedding values.
    pub values: Embedding,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Similarity metric configured on an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity.
    Cosine,
    /// Euclidean distance.
    Euclidean,
    /// Raw dot product.
    #[serde(rename = "dotproduct")]
    #[value(name = "dotproduct")]
    DotProduct,
}

impl Metric {
    /// Wire name used by hosted vector stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::DotProduct => "dotproduct",
        }
    }
}

/// Shape of a named vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Vector length every record must have.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: Metric,
}

/// State of an index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    /// Index name.
    pub name: String,
    /// Configured dimension.
    pub dimension: usize,
    /// Configured metric, when reported.
    pub metric: Option<Metric>,
    /// Whether the index accepts reads and writes.
    pub ready: bool,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    /// Vector id.
    pub id: String,
    /// Similarity score; larger is closer.
    pub score: f32,
    /// Raw vector values when the store returned them.
    #[serde(default)]
    pub values: Option<Embedding>,
    /// Stored metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueryMatch {
    /// Chunk text stored in the metadata, if any.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").and_then(Value::as_str)
    }

    /// Source document id stored in the metadata, if any.
    pub fn source_id(&self) -> Option<&str> {
        self.metadata.get("source_id").and_then(Value::as_str)
    }
}
