//! Per-process runtime context.
//!
//! All shared handles — the SQLite pools behind the embedding cache and the
//! vector store, and the HTTP-backed model collaborators — are constructed
//! once here and passed into the components that need them. Nothing in the
//! crate reaches for ambient global state; shutdown is an explicit
//! [`Agent::shutdown`] once the run is over.

use std::sync::Arc;

use crate::agent::{Agent, RagPipeline};
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::Result;
use crate::llm::{ChatModel, OpenAiChat};
use crate::store::VectorStore;

pub struct Context {
    pub cache: EmbeddingCache,
    pub store: VectorStore,
    pub chat: Arc<dyn ChatModel>,
    retrieval: crate::config::RetrievalConfig,
}

impl Context {
    /// Open the runtime context from configuration: connect both databases
    /// and build the OpenAI-backed collaborators.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.model)?);
        Self::open_with(config, embedder, chat).await
    }

    /// Open the context with explicit collaborators. This is the seam the
    /// integration tests use to substitute scripted models.
    pub async fn open_with(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let cache = EmbeddingCache::open(&config.db.cache_path, embedder).await?;
        let store = VectorStore::open(&config.db.store_path).await?;

        Ok(Self {
            cache,
            store,
            chat,
            retrieval: config.retrieval.clone(),
        })
    }

    /// Assemble the conversation orchestrator, transferring ownership of the
    /// context's resources. [`Agent::shutdown`] closes them afterwards.
    pub fn agent(self) -> Agent {
        let chat = self.chat.clone();
        let pipeline = RagPipeline::new(self.store, self.cache, self.chat, self.retrieval);
        Agent::new(chat, pipeline)
    }
}
