//! Vector store contract and its implementations.

use crate::document::{IndexDescriptor, IndexStatus, IndexedVector, QueryMatch};
use crate::error::Result;

mod memory;
pub mod pinecone;

pub use memory::MemoryStore;
pub use pinecone::PineconeStore;

/// Named vector indexes supporting upsert-by-id and nearest-neighbour queries.
pub trait VectorStore: Send + Sync {
    /// Names of every index visible to the caller.
    fn list_indexes(&self) -> Result<Vec<String>>;

    /// Creates an index with the descriptor's dimension and metric.
    fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()>;

    /// Current shape and readiness of an index.
    fn describe_index(&self, name: &str) -> Result<IndexStatus>;

    /// Inserts or overwrites vectors by id.
    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()>;

    /// Returns up to `top_k` matches, metadata and values included, best first.
    fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>>;
}

impl<T: VectorStore + ?Sized> VectorStore for Box<T> {
    fn list_indexes(&self) -> Result<Vec<String>> {
        (**self).list_indexes()
    }

    fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
        (**self).create_index(descriptor)
    }

    fn describe_index(&self, name: &str) -> Result<IndexStatus> {
        (**self).describe_index(name)
    }

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
        (**self).upsert(index, vectors)
    }

    fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        (**self).query(index, vector, top_k)
    }
}
