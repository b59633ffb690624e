//! Chunk, embed and upsert documents into a vector index.
//!
//! Each document is chunked, embedded with a single batched call, and
//! written in upsert batches of at most `batch_size` vectors. Chunk ids are
//! derived from the source id and ordinal, so re-indexing the same corpus
//! overwrites existing vectors instead of duplicating them.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::chunker::chunk_document;
use crate::document::{
    normalize_for_embedding, ChunkMetadata, Document, IndexDescriptor, IndexedVector,
};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::store::VectorStore;

/// Default number of vectors per upsert call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Outcome for one fully indexed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    /// Document id.
    pub source_id: String,
    /// Chunks produced and written.
    pub chunks: usize,
    /// Upsert calls issued.
    pub batches: usize,
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingReport {
    /// Completed documents, in input order.
    pub documents: Vec<DocumentReport>,
    /// Total vectors written.
    pub vectors_upserted: usize,
    /// Total upsert calls issued.
    pub upsert_calls: usize,
}

impl IndexingReport {
    fn record(&mut self, doc: DocumentReport) {
        self.vectors_upserted += doc.chunks;
        self.upsert_calls += doc.batches;
        self.documents.push(doc);
    }
}

/// Stage in which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Splitting the text.
    Chunking,
    /// Embedding the chunk set.
    Embedding,
    /// Writing one upsert batch.
    Upsert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Upsert => "upsert",
        })
    }
}

/// A run that stopped on the first failing document.
///
/// `chunk_range` names the ordinals of the failed batch so it can be retried
/// alone. `completed` lists the documents before the failing one in input
/// order, all fully written. With several workers, documents after it may
/// also have been written; re-indexing overwrites them by id.
#[derive(Debug, Error)]
#[error("indexing '{source_id}' failed during {stage} of chunks {chunk_range:?}: {error}")]
pub struct IndexingFailure {
    /// Document that failed.
    pub source_id: String,
    /// Failing stage.
    pub stage: Stage,
    /// Chunk ordinals covered by the failed call.
    pub chunk_range: Range<usize>,
    /// Batches of the failing document written before the failure.
    pub batches_written: usize,
    /// Documents preceding the failing one, all fully indexed.
    pub completed: IndexingReport,
    /// Underlying condition.
    #[source]
    pub error: RagError,
}

impl From<IndexingFailure> for RagError {
    fn from(failure: IndexingFailure) -> Self {
        failure.error
    }
}

struct DocumentFailure {
    source_id: String,
    stage: Stage,
    chunk_range: Range<usize>,
    batches_written: usize,
    error: RagError,
}

impl DocumentFailure {
    fn into_failure(self, completed: IndexingReport) -> IndexingFailure {
        IndexingFailure {
            source_id: self.source_id,
            stage: self.stage,
            chunk_range: self.chunk_range,
            batches_written: self.batches_written,
            completed,
            error: self.error,
        }
    }
}

/// Drives chunking, embedding and batched upserts.
pub struct Indexer<'a, E: ?Sized, S: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    chunk_size: usize,
    batch_size: usize,
    workers: usize,
}

impl<'a, E, S> Indexer<'a, E, S>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    /// Builds an indexer; both sizes must be positive.
    pub fn new(embedder: &'a E, store: &'a S, chunk_size: usize, batch_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunk size must be positive"));
        }
        if batch_size == 0 {
            return Err(RagError::config("batch size must be positive"));
        }
        Ok(Self {
            embedder,
            store,
            chunk_size,
            batch_size,
            workers: 1,
        })
    }

    /// Number of documents indexed concurrently (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Indexes every document into `descriptor`, stopping on the first failure.
    pub fn index_documents(
        &self,
        docs: &[Document],
        descriptor: &IndexDescriptor,
    ) -> Result<IndexingReport, IndexingFailure> {
        info!(
            index = %descriptor.name,
            documents = docs.len(),
            workers = self.workers,
            "indexing documents"
        );
        let result = if self.workers > 1 && docs.len() > 1 {
            self.index_parallel(docs, descriptor)
        } else {
            self.index_sequential(docs, descriptor)
        };
        match &result {
            Ok(report) => info!(
                index = %descriptor.name,
                vectors = report.vectors_upserted,
                upserts = report.upsert_calls,
                "index updated"
            ),
            Err(failure) => error!(
                index = %descriptor.name,
                source_id = %failure.source_id,
                stage = %failure.stage,
                chunks = ?failure.chunk_range,
                completed = failure.completed.documents.len(),
                error = %failure.error,
                "indexing stopped"
            ),
        }
        result
    }

    fn index_sequential(
        &self,
        docs: &[Document],
        descriptor: &IndexDescriptor,
    ) -> Result<IndexingReport, IndexingFailure> {
        let mut report = IndexingReport::default();
        for doc in docs {
            match self.index_document(doc, descriptor) {
                Ok(done) => report.record(done),
                Err(failure) => return Err(failure.into_failure(report)),
            }
        }
        Ok(report)
    }

    fn index_parallel(
        &self,
        docs: &[Document],
        descriptor: &IndexDescriptor,
    ) -> Result<IndexingReport, IndexingFailure> {
        let stop = AtomicBool::new(false);
        let mut finished: Vec<Option<DocumentReport>> = vec![None; docs.len()];
        let mut first_failure: Option<(usize, DocumentFailure)> = None;

        thread::scope(|scope| {
            let (task_tx, task_rx) = bounded::<(usize, &Document)>(self.workers * 2);
            let (result_tx, result_rx) = bounded(self.workers * 2);

            for worker_id in 0..self.workers {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                scope.spawn(move || {
                    for (position, doc) in rx.iter() {
                        debug!(worker = worker_id, source_id = %doc.source_id, "worker picked document");
                        let outcome = self.index_document(doc, descriptor);
                        if tx.send((position, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            let stop = &stop;
            scope.spawn(move || {
                for task in docs.iter().enumerate() {
                    if stop.load(Ordering::SeqCst) || task_tx.send(task).is_err() {
                        break;
                    }
                }
            });

            for (position, outcome) in result_rx.iter() {
                match outcome {
                    Ok(done) => finished[position] = Some(done),
                    Err(failure) => {
                        stop.store(true, Ordering::SeqCst);
                        if first_failure.as_ref().map_or(true, |(at, _)| position < *at) {
                            first_failure = Some((position, failure));
                        }
                    }
                }
            }
        });

        let cutoff = first_failure.as_ref().map_or(docs.len(), |(at, _)| *at);
        let mut report = IndexingReport::default();
        for done in finished.into_iter().take(cutoff).flatten() {
            report.record(done);
        }
        match first_failure {
            Some((_, failure)) => Err(failure.into_failure(report)),
            None => Ok(report),
        }
    }

    fn index_document(
        &self,
        doc: &Document,
        descriptor: &IndexDescriptor,
    ) -> Result<DocumentReport, DocumentFailure> {
        let fail = |stage: Stage,
                    chunk_range: Range<usize>,
                    batches_written: usize,
                    error: RagError| DocumentFailure {
            source_id: doc.source_id.clone(),
            stage,
            chunk_range,
            batches_written,
            error,
        };

        info!(source_id = %doc.source_id, "processing document");
        let chunks = chunk_document(doc, self.chunk_size)
            .map_err(|err| fail(Stage::Chunking, 0..0, 0, err))?;
        debug!(source_id = %doc.source_id, chunks = chunks.len(), "split text into chunks");
        if chunks.is_empty() {
            return Ok(DocumentReport {
                source_id: doc.source_id.clone(),
                chunks: 0,
                batches: 0,
            });
        }

        let all = 0..chunks.len();
        let normalized: Vec<String> = chunks
            .iter()
            .map(|chunk| normalize_for_embedding(&chunk.text))
            .collect();
        let inputs: Vec<&str> = normalized.iter().map(String::as_str).collect();
        let embeddings = self
            .embedder
            .embed_batch(&inputs)
            .map_err(|err| fail(Stage::Embedding, all.clone(), 0, err))?;
        if embeddings.len() != chunks.len() {
            let err = RagError::InvalidResponse {
                provider: "embedder",
                detail: format!(
                    "returned {} embeddings for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            };
            return Err(fail(Stage::Embedding, all, 0, err));
        }
        if let Some(bad) = embeddings.iter().find(|v| v.len() != descriptor.dimension) {
            let err = RagError::DimensionMismatch {
                expected: descriptor.dimension,
                actual: bad.len(),
            };
            return Err(fail(Stage::Embedding, all, 0, err));
        }

        let vectors: Vec<IndexedVector> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| IndexedVector {
                id: chunk.id.clone(),
                values,
                metadata: ChunkMetadata::from(chunk),
            })
            .collect();

        let mut batches = 0usize;
        for (batch_no, batch) in vectors.chunks(self.batch_size).enumerate() {
            let start = batch_no * self.batch_size;
            let range = start..start + batch.len();
            debug!(source_id = %doc.source_id, chunks = ?range, "upserting batch");
            self.store
                .upsert(&descriptor.name, batch)
                .map_err(|err| fail(Stage::Upsert, range, batches, err))?;
            batches += 1;
        }
        info!(
            source_id = %doc.source_id,
            vectors = vectors.len(),
            batches,
            "document indexed"
        );
        Ok(DocumentReport {
            source_id: doc.source_id.clone(),
            chunks: vectors.len(),
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Embedding, IndexStatus, Metric, QueryMatch};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const DIM: usize = 4;

    struct FixedEmbedder {
        dimension: usize,
    }

    impl Embedder for FixedEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let mut v = vec![0.0; self.dimension];
                    v[0] = text.len() as f32;
                    v
                })
                .collect())
        }
    }

    /// Records upsert batches and fails the `fail_on`-th call (1-based).
    struct RecordingStore {
        inner: MemoryStore,
        batches: Mutex<Vec<Vec<String>>>,
        fail_on: Option<usize>,
    }

    impl RecordingStore {
        fn new(fail_on: Option<usize>) -> Self {
            let inner = MemoryStore::new();
            inner.create_index(&descriptor()).unwrap();
            Self {
                inner,
                batches: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    impl VectorStore for RecordingStore {
        fn list_indexes(&self) -> Result<Vec<String>> {
            self.inner.list_indexes()
        }

        fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
            self.inner.create_index(descriptor)
        }

        fn describe_index(&self, name: &str) -> Result<IndexStatus> {
            self.inner.describe_index(name)
        }

        fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_on == Some(batches.len() + 1) {
                return Err(RagError::ProviderUnavailable {
                    provider: "test",
                    detail: "boom".into(),
                    transient: true,
                });
            }
            batches.push(vectors.iter().map(|v| v.id.clone()).collect());
            self.inner.upsert(index, vectors)
        }

        fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
            self.inner.query(index, vector, top_k)
        }
    }

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            name: "test".into(),
            dimension: DIM,
            metric: Metric::Cosine,
        }
    }

    fn doc_with_chunks(source_id: &str, chunks: usize) -> Document {
        // Ten characters per chunk with a chunk size of 10.
        Document::new(source_id, "abcdefghi ".repeat(chunks))
    }

    #[test]
    fn batches_cover_every_chunk_exactly_once() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = RecordingStore::new(None);
        let indexer = Indexer::new(&embedder, &store, 10, 4).unwrap();
        let report = indexer
            .index_documents(&[doc_with_chunks("d", 10)], &descriptor())
            .unwrap();

        let batches = store.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 3);
        assert_eq!(report.upsert_calls, 3);
        let mut ids: Vec<String> = batches.into_iter().flatten().collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(total, 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(store.inner.vector_count("test"), 10);
    }

    #[test]
    fn reindexing_overwrites_instead_of_duplicating() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = MemoryStore::new();
        store.create_index(&descriptor()).unwrap();
        let indexer = Indexer::new(&embedder, &store, 10, 100).unwrap();
        let docs = [doc_with_chunks("a", 3), doc_with_chunks("b", 2)];
        indexer.index_documents(&docs, &descriptor()).unwrap();
        indexer.index_documents(&docs, &descriptor()).unwrap();
        assert_eq!(
            store.ids("test"),
            vec!["a_0", "a_1", "a_2", "b_0", "b_1"]
        );
    }

    #[test]
    fn failure_reports_batch_range_and_completed_documents() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = RecordingStore::new(Some(3));
        let indexer = Indexer::new(&embedder, &store, 10, 2).unwrap();
        let docs = [
            doc_with_chunks("first", 2),
            doc_with_chunks("second", 5),
            doc_with_chunks("third", 1),
        ];
        let failure = indexer.index_documents(&docs, &descriptor()).unwrap_err();
        assert_eq!(failure.source_id, "second");
        assert_eq!(failure.stage, Stage::Upsert);
        assert_eq!(failure.chunk_range, 2..4);
        assert_eq!(failure.batches_written, 1);
        assert_eq!(
            failure.completed.documents,
            vec![DocumentReport {
                source_id: "first".into(),
                chunks: 2,
                batches: 1,
            }]
        );
        assert!(matches!(
            RagError::from(failure),
            RagError::ProviderUnavailable { .. }
        ));
    }

    #[test]
    fn wrong_dimension_stops_before_any_write() {
        let embedder = FixedEmbedder { dimension: DIM + 1 };
        let store = RecordingStore::new(None);
        let indexer = Indexer::new(&embedder, &store, 10, 2).unwrap();
        let failure = indexer
            .index_documents(&[doc_with_chunks("d", 3)], &descriptor())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Embedding);
        assert!(matches!(failure.error, RagError::DimensionMismatch { .. }));
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_documents_are_reported_without_calls() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = RecordingStore::new(None);
        let indexer = Indexer::new(&embedder, &store, 10, 2).unwrap();
        let report = indexer
            .index_documents(&[Document::new("blank", "  \n ")], &descriptor())
            .unwrap();
        assert_eq!(report.documents[0].chunks, 0);
        assert_eq!(report.upsert_calls, 0);
    }

    #[test]
    fn zero_sizes_are_configuration_errors() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = MemoryStore::new();
        assert!(Indexer::new(&embedder, &store, 0, 1).is_err());
        assert!(Indexer::new(&embedder, &store, 1, 0).is_err());
    }

    #[test]
    fn workers_index_all_documents_in_input_order() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = MemoryStore::new();
        store.create_index(&descriptor()).unwrap();
        let docs: Vec<Document> = (0..12)
            .map(|i| doc_with_chunks(&format!("doc{i:02}"), i % 4 + 1))
            .collect();
        let report = Indexer::new(&embedder, &store, 10, 2)
            .unwrap()
            .with_workers(4)
            .index_documents(&docs, &descriptor())
            .unwrap();
        let order: Vec<_> = report.documents.iter().map(|d| d.source_id.clone()).collect();
        let expected: Vec<_> = docs.iter().map(|d| d.source_id.clone()).collect();
        assert_eq!(order, expected);
        assert_eq!(report.vectors_upserted, store.vector_count("test"));
        assert_eq!(report.vectors_upserted, 30);
    }

    /// Rejects every upsert that touches one of the listed documents.
    struct RejectingStore {
        inner: MemoryStore,
        rejected: Vec<&'static str>,
    }

    impl VectorStore for RejectingStore {
        fn list_indexes(&self) -> Result<Vec<String>> {
            self.inner.list_indexes()
        }

        fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
            self.inner.create_index(descriptor)
        }

        fn describe_index(&self, name: &str) -> Result<IndexStatus> {
            self.inner.describe_index(name)
        }

        fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
            let rejected = |v: &IndexedVector| self.rejected.iter().any(|r| *r == v.metadata.source_id);
            if vectors.iter().any(rejected) {
                return Err(RagError::ProviderRejected {
                    provider: "test",
                    status: 400,
                    detail: "rejected".into(),
                });
            }
            self.inner.upsert(index, vectors)
        }

        fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
            self.inner.query(index, vector, top_k)
        }
    }

    #[test]
    fn parallel_failure_reports_earliest_document_and_its_predecessors() {
        let embedder = FixedEmbedder { dimension: DIM };
        let store = RejectingStore {
            inner: MemoryStore::new(),
            rejected: vec!["doc05", "doc08"],
        };
        store.create_index(&descriptor()).unwrap();
        let docs: Vec<Document> = (0..12)
            .map(|i| doc_with_chunks(&format!("doc{i:02}"), 2))
            .collect();
        for _ in 0..5 {
            let failure = Indexer::new(&embedder, &store, 10, 2)
                .unwrap()
                .with_workers(4)
                .index_documents(&docs, &descriptor())
                .unwrap_err();
            assert_eq!(failure.source_id, "doc05");
            let completed: Vec<_> = failure
                .completed
                .documents
                .iter()
                .map(|d| d.source_id.as_str())
                .collect();
            assert_eq!(completed, vec!["doc00", "doc01", "doc02", "doc03", "doc04"]);
            assert_eq!(failure.completed.vectors_upserted, 10);
        }
    }
}
