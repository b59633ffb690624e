//! Process-local vector store with exact scoring.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use super::VectorStore;
use crate::document::{
    Embedding, IndexDescriptor, IndexStatus, IndexedVector, Metric, QueryMatch,
};
use crate::error::{RagError, Result};

const PROVIDER: &str = "memory";

/// In-memory [`VectorStore`]. Indexes are ready as soon as they are created.
///
/// Euclidean indexes score matches as `1 / (1 + distance)` so that every
/// metric ranks best-first by descending score.
#[derive(Debug, Default)]
pub struct MemoryStore {
    indexes: Mutex<HashMap<String, MemoryIndex>>,
}

#[derive(Debug)]
struct MemoryIndex {
    descriptor: IndexDescriptor,
    records: HashMap<String, StoredVector>,
}

#[derive(Debug)]
struct StoredVector {
    values: Embedding,
    metadata: Map<String, Value>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors currently held by `index`, zero if it does not exist.
    pub fn vector_count(&self, index: &str) -> usize {
        self.lock()
            .get(index)
            .map(|idx| idx.records.len())
            .unwrap_or(0)
    }

    /// Sorted ids stored in `index`.
    pub fn ids(&self, index: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .get(index)
            .map(|idx| idx.records.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryIndex>> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing_index(name: &str) -> RagError {
    RagError::ProviderRejected {
        provider: PROVIDER,
        status: 404,
        detail: format!("index '{name}' does not exist"),
    }
}

impl VectorStore for MemoryStore {
    fn list_indexes(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
        if descriptor.dimension == 0 {
            return Err(RagError::config("index dimension must be positive"));
        }
        let mut indexes = self.lock();
        if indexes.contains_key(&descriptor.name) {
            return Err(RagError::ProviderRejected {
                provider: PROVIDER,
                status: 409,
                detail: format!("index '{}' already exists", descriptor.name),
            });
        }
        indexes.insert(
            descriptor.name.clone(),
            MemoryIndex {
                descriptor: descriptor.clone(),
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    fn describe_index(&self, name: &str) -> Result<IndexStatus> {
        let indexes = self.lock();
        let index = indexes.get(name).ok_or_else(|| missing_index(name))?;
        Ok(IndexStatus {
            name: name.to_string(),
            dimension: index.descriptor.dimension,
            metric: Some(index.descriptor.metric),
            ready: true,
        })
    }

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
        let mut indexes = self.lock();
        let target = indexes.get_mut(index).ok_or_else(|| missing_index(index))?;
        let expected = target.descriptor.dimension;
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != expected) {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: bad.values.len(),
            });
        }
        for vector in vectors {
            let metadata = match serde_json::to_value(&vector.metadata) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            target.records.insert(
                vector.id.clone(),
                StoredVector {
                    values: vector.values.clone(),
                    metadata,
                },
            );
        }
        Ok(())
    }

    fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let indexes = self.lock();
        let target = indexes.get(index).ok_or_else(|| missing_index(index))?;
        if vector.len() != target.descriptor.dimension {
            return Err(RagError::DimensionMismatch {
                expected: target.descriptor.dimension,
                actual: vector.len(),
            });
        }
        let metric = target.descriptor.metric;
        let mut matches: Vec<QueryMatch> = target
            .records
            .iter()
            .map(|(id, stored)| QueryMatch {
                id: id.clone(),
                score: score(metric, vector, &stored.values),
                values: Some(stored.values.clone()),
                metadata: stored.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::DotProduct => dot(a, b),
        Metric::Cosine => {
            let norms = magnitude(a) * magnitude(b);
            if norms == 0.0 {
                0.0
            } else {
                dot(a, b) / norms
            }
        }
        Metric::Euclidean => {
            let distance = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn magnitude(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkMetadata;

    fn descriptor(metric: Metric) -> IndexDescriptor {
        IndexDescriptor {
            name: "idx".into(),
            dimension: 2,
            metric,
        }
    }

    fn vector(id: &str, values: [f32; 2]) -> IndexedVector {
        IndexedVector {
            id: id.into(),
            values: values.to_vec(),
            metadata: ChunkMetadata {
                source_id: "doc".into(),
                ordinal: 0,
                text: format!("text of {id}"),
                line_from: 1,
                line_to: 1,
            },
        }
    }

    #[test]
    fn upsert_overwrites_by_id() {
        let store = MemoryStore::new();
        store.create_index(&descriptor(Metric::Cosine)).unwrap();
        store.upsert("idx", &[vector("a", [1.0, 0.0])]).unwrap();
        store.upsert("idx", &[vector("a", [0.0, 1.0])]).unwrap();
        assert_eq!(store.vector_count("idx"), 1);
        let hits = store.query("idx", &[0.0, 1.0], 5).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn query_ranks_best_first_and_truncates() {
        let store = MemoryStore::new();
        store.create_index(&descriptor(Metric::Euclidean)).unwrap();
        store
            .upsert(
                "idx",
                &[
                    vector("far", [10.0, 10.0]),
                    vector("near", [1.0, 1.0]),
                    vector("mid", [3.0, 3.0]),
                ],
            )
            .unwrap();
        let hits = store.query("idx", &[1.0, 1.0], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(hits[0].text(), Some("text of near"));
    }

    #[test]
    fn rejects_wrong_dimension_and_duplicate_create() {
        let store = MemoryStore::new();
        store.create_index(&descriptor(Metric::DotProduct)).unwrap();
        let mut bad = vector("a", [1.0, 0.0]);
        bad.values.push(2.0);
        assert!(matches!(
            store.upsert("idx", &[bad]),
            Err(RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(store.create_index(&descriptor(Metric::DotProduct)).is_err());
    }

    #[test]
    fn empty_index_returns_no_matches() {
        let store = MemoryStore::new();
        store.create_index(&descriptor(Metric::Cosine)).unwrap();
        assert!(store.query("idx", &[1.0, 0.0], 10).unwrap().is_empty());
    }
}
