use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docrag::embedder::openai::DEFAULT_EMBEDDING_MODEL;
use docrag::llm::{DEFAULT_ANTHROPIC_MODEL, DEFAULT_CHAT_MODEL};
use docrag::store::pinecone::ServerlessSpec;
use docrag::{
    load_directory, AnthropicProvider, Cli, LlmKind, LlmProvider, MemoryStore, OpenAiEmbedder,
    OpenAiProvider, Pipeline, PineconeStore, StoreKind, VectorStore,
};

/// Inputs per embeddings request; the API accepts up to 2048.
const EMBED_INPUTS_PER_REQUEST: usize = 256;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docrag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.build_config().context("invalid configuration")?;
    let timeout = config.request_timeout;

    let openai_key = cli
        .openai_api_key
        .as_deref()
        .context("OPENAI_API_KEY is required for embeddings")?;
    let dimensions = (cli.embedding_model != DEFAULT_EMBEDDING_MODEL).then_some(config.dimension);
    let embedder = OpenAiEmbedder::new(
        openai_key,
        &cli.openai_base_url,
        cli.embedding_model.clone(),
        dimensions,
        timeout,
        EMBED_INPUTS_PER_REQUEST,
    )?;

    let store: Box<dyn VectorStore> = match cli.store {
        StoreKind::Memory => Box::new(MemoryStore::new()),
        StoreKind::Pinecone => {
            let key = cli
                .pinecone_api_key
                .as_deref()
                .context("PINECONE_API_KEY is required for the pinecone store")?;
            Box::new(PineconeStore::new(
                key,
                &cli.pinecone_url,
                cli.namespace.clone(),
                ServerlessSpec {
                    cloud: cli.cloud.clone(),
                    region: cli.region.clone(),
                },
                timeout,
            )?)
        }
    };

    let llm: Box<dyn LlmProvider> = match cli.llm {
        LlmKind::Openai => Box::new(OpenAiProvider::new(
            openai_key,
            &cli.openai_base_url,
            cli.chat_model
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            timeout,
        )?),
        LlmKind::Anthropic => {
            let key = cli
                .anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required for the anthropic provider")?;
            Box::new(AnthropicProvider::new(
                key,
                &cli.anthropic_base_url,
                cli.chat_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
                timeout,
            )?)
        }
    };

    let pipeline = Pipeline::new(config, embedder, store, llm)?;
    let answer = if cli.skip_index {
        pipeline.ask(&cli.question)?
    } else {
        let docs = load_directory(&cli.docs, &cli.extension_list())
            .with_context(|| format!("failed to load documents from {}", cli.docs.display()))?;
        pipeline.run(&docs, &cli.question)?
    };

    println!("{answer}");
    Ok(())
}
