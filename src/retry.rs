//! Bounded exponential backoff around provider calls.
//!
//! [`Retrying`] wraps any embedder, vector store or LLM provider and retries
//! the conditions [`crate::RagError::is_retryable`] marks as transient. Fatal errors
//! are returned on the first attempt.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::document::{Embedding, IndexDescriptor, IndexStatus, IndexedVector, QueryMatch};
use crate::embedder::Embedder;
use crate::error::Result;
use crate::llm::{LlmProvider, ProviderRequest};
use crate::store::VectorStore;

/// Retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: usize,
    /// Delay before the first retry; doubled on each later retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay applied before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation`, retrying transient failures until the attempt budget is spent.
    pub fn run<T, F>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %err,
                        "retrying after transient failure"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
        }
    }
}

/// Decorator that applies a [`RetryPolicy`] to every call of the inner value.
#[derive(Debug, Clone)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retrying<T> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Borrow the wrapped value.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwraps the decorator.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<E: Embedder> Embedder for Retrying<E> {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Embedding>> {
        self.policy
            .run("embed_batch", || self.inner.embed_batch(inputs))
    }

    fn embed_one(&self, input: &str) -> Result<Embedding> {
        self.policy.run("embed_one", || self.inner.embed_one(input))
    }
}

impl<S: VectorStore> VectorStore for Retrying<S> {
    fn list_indexes(&self) -> Result<Vec<String>> {
        self.policy.run("list_indexes", || self.inner.list_indexes())
    }

    // Creating an index twice is not idempotent on hosted stores, so a
    // transient failure here surfaces to the provisioner instead.
    fn create_index(&self, descriptor: &IndexDescriptor) -> Result<()> {
        self.inner.create_index(descriptor)
    }

    fn describe_index(&self, name: &str) -> Result<IndexStatus> {
        self.policy
            .run("describe_index", || self.inner.describe_index(name))
    }

    fn upsert(&self, index: &str, vectors: &[IndexedVector]) -> Result<()> {
        self.policy.run("upsert", || self.inner.upsert(index, vectors))
    }

    fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        self.policy
            .run("query", || self.inner.query(index, vector, top_k))
    }
}

impl<L: LlmProvider> LlmProvider for Retrying<L> {
    fn answer(&self, request: &ProviderRequest) -> Result<String> {
        self.policy.run("answer", || self.inner.answer(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use std::cell::Cell;

    fn instant(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn limited() -> RagError {
        RagError::RateLimited {
            provider: "test",
            detail: "429".into(),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(4), Duration::from_secs(4));
        assert_eq!(policy.backoff(30), Duration::from_secs(16));
    }

    #[test]
    fn recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let value = instant(3)
            .run("op", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(limited())
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn surfaces_last_error_when_budget_runs_out() {
        let calls = Cell::new(0);
        let err = instant(2)
            .run::<(), _>("op", || {
                calls.set(calls.get() + 1);
                Err(limited())
            })
            .unwrap_err();
        assert!(matches!(err, RagError::RateLimited { .. }));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = instant(5)
            .run::<(), _>("op", || {
                calls.set(calls.get() + 1);
                Err(RagError::config("bad"))
            })
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert_eq!(calls.get(), 1);
    }
}
