//! Idempotent index provisioning with a bounded readiness wait.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::document::IndexDescriptor;
use crate::error::{RagError, Result};
use crate::store::VectorStore;

/// How long to wait for an index to accept traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Give up after this long.
    pub timeout: Duration,
    /// Pause between readiness checks.
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// What [`ensure_index`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The index was missing and has been created.
    Created,
    /// The index was already present.
    AlreadyExisted,
}

/// Makes sure `descriptor` exists with the right dimension and is ready.
///
/// Safe to call from every run: an existing index is only inspected.
pub fn ensure_index<S: VectorStore + ?Sized>(
    store: &S,
    descriptor: &IndexDescriptor,
    readiness: &ReadinessPolicy,
) -> Result<Provisioned> {
    info!(index = %descriptor.name, "checking index");
    let existing = store.list_indexes()?;
    let outcome = if existing.iter().any(|name| name == &descriptor.name) {
        info!(index = %descriptor.name, "index already exists");
        Provisioned::AlreadyExisted
    } else {
        info!(
            index = %descriptor.name,
            dimension = descriptor.dimension,
            metric = descriptor.metric.as_str(),
            "creating index"
        );
        store.create_index(descriptor)?;
        Provisioned::Created
    };
    wait_until_ready(store, descriptor, readiness)?;
    Ok(outcome)
}

fn wait_until_ready<S: VectorStore + ?Sized>(
    store: &S,
    descriptor: &IndexDescriptor,
    readiness: &ReadinessPolicy,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let status = store.describe_index(&descriptor.name)?;
        if status.dimension != descriptor.dimension {
            return Err(RagError::DimensionMismatch {
                expected: descriptor.dimension,
                actual: status.dimension,
            });
        }
        if status.ready {
            debug!(index = %descriptor.name, waited = ?started.elapsed(), "index ready");
            return Ok(());
        }
        let waited = started.elapsed();
        if waited >= readiness.timeout {
            return Err(RagError::ProvisioningTimeout {
                index: descriptor.name.clone(),
                waited,
            });
        }
        debug!(index = %descriptor.name, ?waited, "index not ready yet");
        thread::sleep(readiness.poll_interval.min(readiness.timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{IndexStatus, IndexedVector, Metric, QueryMatch};
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(dimension: usize) -> IndexDescriptor {
        IndexDescriptor {
            name: "corpus".into(),
            dimension,
            metric: Metric::Cosine,
        }
    }

    fn quick() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        }
    }

    /// Counts creates and reports ready only after `ready_after` describes.
    struct SlowStore {
        inner: MemoryStore,
        creates: AtomicUsize,
        describes: AtomicUsize,
        ready_after: usize,
    }

    impl SlowStore {
        fn new(ready_after: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                creates: AtomicUsize::new(0),
                describes: AtomicUsize::new(0),
                ready_after,
            }
        }
    }

    impl VectorStore for SlowStore {
        fn list_indexes(&self) -> Result<Vec<String>> {
            self.inner.list_indexes()
        }

        fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_index(descriptor)
        }

        fn describe_index(&self, name: &str) -> Result<IndexStatus> {
            let seen = self.describes.fetch_add(1, Ordering::SeqCst) + 1;
            let mut status = self.inner.describe_index(name)?;
            status.ready = seen > self.ready_after;
            Ok(status)
        }

        fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
            self.inner.upsert(index, vectors)
        }

        fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
            self.inner.query(index, vector, top_k)
        }
    }

    #[test]
    fn creates_once_across_repeated_calls() {
        let store = SlowStore::new(0);
        let first = ensure_index(&store, &descriptor(4), &quick()).unwrap();
        let second = ensure_index(&store, &descriptor(4), &quick()).unwrap();
        assert_eq!(first, Provisioned::Created);
        assert_eq!(second, Provisioned::AlreadyExisted);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn polls_until_ready() {
        let store = SlowStore::new(2);
        let policy = ReadinessPolicy {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
        };
        ensure_index(&store, &descriptor(4), &policy).unwrap();
        assert_eq!(store.describes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn times_out_when_never_ready() {
        let store = SlowStore::new(usize::MAX);
        let err = ensure_index(&store, &descriptor(4), &quick()).unwrap_err();
        assert!(matches!(err, RagError::ProvisioningTimeout { ref index, .. } if index == "corpus"));
    }

    #[test]
    fn existing_index_with_other_dimension_is_rejected() {
        let store = MemoryStore::new();
        store.create_index(&descriptor(8)).unwrap();
        let err = ensure_index(&store, &descriptor(4), &quick()).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 4,
                actual: 8
            }
        ));
    }
}
