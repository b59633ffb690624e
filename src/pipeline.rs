//! End-to-end orchestration: provision, index, retrieve, synthesize.

use tracing::{info, info_span};

use crate::config::PipelineConfig;
use crate::document::{Document, IndexDescriptor};
use crate::embedder::Embedder;
use crate::error::Result;
use crate::indexer::{Indexer, IndexingReport};
use crate::llm::LlmProvider;
use crate::provisioner::{self, Provisioned};
use crate::retriever;
use crate::retry::Retrying;
use crate::store::VectorStore;
use crate::synthesizer::{Answer, Synthesizer};

/// Owns the collaborators of one run and sequences the stages.
///
/// Every collaborator is wrapped in [`Retrying`] with the configured policy,
/// so transient provider failures are retried before a stage gives up.
pub struct Pipeline<E, S, L> {
    config: PipelineConfig,
    descriptor: IndexDescriptor,
    synthesizer: Synthesizer,
    embedder: Retrying<E>,
    store: Retrying<S>,
    llm: Retrying<L>,
}

impl<E, S, L> Pipeline<E, S, L>
where
    E: Embedder,
    S: VectorStore,
    L: LlmProvider,
{
    /// Validates `config` and wraps the collaborators.
    pub fn new(config: PipelineConfig, embedder: E, store: S, llm: L) -> Result<Self> {
        config.validate()?;
        let policy = config.retry;
        Ok(Self {
            descriptor: config.descriptor(),
            synthesizer: config.synthesizer(),
            embedder: Retrying::new(embedder, policy),
            store: Retrying::new(store, policy),
            llm: Retrying::new(llm, policy),
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The wrapped vector store.
    pub fn store(&self) -> &S {
        self.store.inner()
    }

    /// Creates the index when missing and waits until it is ready.
    pub fn ensure_index(&self) -> Result<Provisioned> {
        provisioner::ensure_index(&self.store, &self.descriptor, &self.config.readiness)
    }

    /// Provisions the index and writes every document into it.
    pub fn index(&self, docs: &[Document]) -> Result<IndexingReport> {
        let _span = info_span!("index", index = %self.descriptor.name).entered();
        self.ensure_index()?;
        let indexer = Indexer::new(
            &self.embedder,
            &self.store,
            self.config.chunk_size,
            self.config.batch_size,
        )?
        .with_workers(self.config.workers);
        Ok(indexer.index_documents(docs, &self.descriptor)?)
    }

    /// Answers `question` from the already populated index.
    pub fn ask(&self, question: &str) -> Result<Answer> {
        let _span = info_span!("ask", index = %self.descriptor.name).entered();
        let matches = retriever::retrieve(
            &self.embedder,
            &self.store,
            question,
            &self.descriptor,
            self.config.top_k,
        )?;
        self.synthesizer.synthesize(&self.llm, question, &matches)
    }

    /// Indexes `docs` and answers `question` over them.
    pub fn run(&self, docs: &[Document], question: &str) -> Result<Answer> {
        info!(
            index = %self.descriptor.name,
            documents = docs.len(),
            "starting run"
        );
        let report = self.index(docs)?;
        info!(
            vectors = report.vectors_upserted,
            upserts = report.upsert_calls,
            "indexing complete"
        );
        self.ask(question)
    }
}
