//! # Viajero CLI
//!
//! Ask natural-language questions against a travel catalog:
//!
//! ```bash
//! viajero "¿Qué incluye el viaje a Roma?"
//! ```
//!
//! On first use (or with `--force`) the catalog directory is chunked,
//! embedded, and indexed into the vector store; afterwards the question runs
//! through the retrieval-augmented conversation loop and the final answer is
//! printed to stdout. Diagnostics go to stderr via `tracing`; any
//! unrecovered fault exits non-zero.

mod agent;
mod cache;
mod catalog;
mod chunk;
mod config;
mod context;
mod db;
mod embedding;
mod error;
mod llm;
mod models;
mod prompt;
mod protocol;
mod store;

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;

use crate::chunk::ChunkPolicy;
use crate::models::Chunk;

/// Viajero — retrieval-augmented question answering over a travel catalog.
#[derive(Parser)]
#[command(
    name = "viajero",
    about = "Retrieval-augmented question answering over a travel catalog",
    version,
    long_about = "Viajero indexes a directory of travel-catalog documents into a SQLite vector \
    store and answers questions through a tool-calling conversation with a language model, \
    validating each answer and widening the retrieval pass when the first answer is judged \
    insufficient. Requires OPENAI_API_KEY."
)]
struct Cli {
    /// Natural-language question for the travel catalog.
    query: String,

    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, default_value = "./viajero.toml")]
    config: PathBuf,

    /// Characters per text chunk when (re)building the index.
    #[arg(short = 'c', long)]
    chunk_size: Option<usize>,

    /// Characters shared between consecutive chunks.
    #[arg(short = 'o', long)]
    overlap: Option<usize>,

    /// Maximum cosine distance for a retrieval match (hits at or beyond are
    /// dropped).
    #[arg(short = 's', long)]
    max_distance: Option<f64>,

    /// Maximum number of retrieved passages per query.
    #[arg(short = 'k', long)]
    max_results: Option<usize>,

    /// Rebuild the embedding store even if it already exists.
    #[arg(short = 'f', long)]
    force: bool,

    /// Verbose diagnostics on stderr.
    #[arg(short = 'd', long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let mut config = config::load_config(&cli.config)?;
    if let Some(chunk_size) = cli.chunk_size {
        config.chunking.chunk_size = chunk_size;
    }
    if let Some(overlap) = cli.overlap {
        config.chunking.overlap = overlap;
    }
    if let Some(max_distance) = cli.max_distance {
        config.retrieval.max_distance = max_distance;
    }
    if let Some(max_results) = cli.max_results {
        config.retrieval.max_results = max_results;
    }
    config.validate()?;

    let rebuild = cli.force || !config.db.store_path.exists();

    let context = context::Context::open(&config).await?;

    if rebuild {
        tracing::info!(force = cli.force, "rebuilding the embedding store");
        let documents = catalog::load_catalog(&config.catalog)?;
        let policy = ChunkPolicy::new(config.chunking.chunk_size, config.chunking.overlap)?;
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| policy.split(&doc.body, &doc.title))
            .collect();
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "catalog chunked"
        );
        context.store.rebuild(&context.cache, &chunks).await?;
    } else {
        let indexed = context.store.count().await?;
        tracing::debug!(chunks = indexed, "using existing embedding store");
    }

    let agent = context.agent();
    let conversation = agent::ask_with_backoff(&agent, &cli.query, &config.backoff)
        .await
        .context("query failed")?;

    println!("{}", conversation.last_content());

    agent.shutdown().await;
    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if debug { "viajero=debug" } else { "viajero=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
