//! Embedding cache and vector store behavior over real SQLite files.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use viajero::cache::EmbeddingCache;
use viajero::embedding::Embedder;
use viajero::error::{Error, Result};
use viajero::models::Chunk;
use viajero::store::VectorStore;

/// Embedder with canned vectors per exact text, a call counter, and an
/// optional set of texts that fail.
struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fail_texts: HashSet<String>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    fn new(vectors: &[(&str, [f32; 3])]) -> Self {
        Self {
            vectors: vectors
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
            fail_texts: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_texts.contains(text) {
            return Err(Error::EmbeddingUnavailable {
                message: "scripted failure".into(),
                retryable: false,
            });
        }
        match self.vectors.get(text) {
            Some(v) => Ok(v.clone()),
            // Deterministic nonzero fallback for texts without a script.
            None => {
                let bytes = text.as_bytes();
                let sum: f32 = bytes.iter().map(|&b| b as f32).sum();
                Ok(vec![
                    1.0 + sum % 97.0,
                    1.0 + bytes.len() as f32 % 89.0,
                    f32::from(*bytes.first().unwrap_or(&1)),
                ])
            }
        }
    }
}

/// Embedder that fails the first `failures` calls, then succeeds.
struct FlakyEmbedder {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky-embedder"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::EmbeddingUnavailable {
                message: "temporarily down".into(),
                retryable: true,
            });
        }
        Ok(vec![0.5, 0.5, 0.5])
    }
}

async fn open_cache(dir: &Path, embedder: Arc<dyn Embedder>) -> EmbeddingCache {
    EmbeddingCache::open(&dir.join("cache.db"), embedder)
        .await
        .unwrap()
}

async fn open_store(dir: &Path) -> VectorStore {
    VectorStore::open(&dir.join("store.db")).await.unwrap()
}

fn chunk(text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        source: "catalogo.md".to_string(),
        index: 0,
    }
}

// ============ Cache ============

#[tokio::test]
async fn test_cache_calls_embedder_at_most_once_per_text() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(MockEmbedder::new(&[("hola", [1.0, 2.0, 3.0])]));
    let cache = open_cache(tmp.path(), embedder.clone()).await;

    let first = cache.get_embedding("hola").await.unwrap();
    let second = cache.get_embedding("hola").await.unwrap();

    assert_eq!(embedder.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_cache_failed_embedding_is_not_cached() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(FlakyEmbedder {
        failures: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });
    let cache = open_cache(tmp.path(), embedder.clone()).await;

    let err = cache.get_embedding("texto").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable { .. }));

    // The failure must not have poisoned the cache: the next call reaches
    // the embedder again and succeeds, and only then does the cache hit.
    assert!(cache.get_embedding("texto").await.is_ok());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

    assert!(cache.get_embedding("texto").await.is_ok());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_deduplicates_identical_text_only() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(MockEmbedder::new(&[]));
    let cache = open_cache(tmp.path(), embedder.clone()).await;

    cache.get_embedding("uno").await.unwrap();
    cache.get_embedding("dos").await.unwrap();
    cache.get_embedding("uno").await.unwrap();

    assert_eq!(embedder.calls(), 2);
}

// ============ Store ============

fn catalog_embedder() -> MockEmbedder {
    MockEmbedder::new(&[
        ("consulta", [1.0, 0.0, 0.0]),
        ("muy cerca", [0.9, 0.1, 0.0]),
        ("cerca", [0.6, 0.4, 0.0]),
        ("lejos", [0.0, 1.0, 0.0]),
        ("opuesto", [-1.0, 0.0, 0.0]),
    ])
}

async fn populated_store(dir: &Path, cache: &EmbeddingCache) -> VectorStore {
    let store = open_store(dir).await;
    let chunks: Vec<Chunk> = ["muy cerca", "cerca", "lejos", "opuesto"]
        .iter()
        .map(|t| chunk(t))
        .collect();
    store.rebuild(cache, &chunks).await.unwrap();
    store
}

#[tokio::test]
async fn test_search_sorted_ascending_and_strictly_filtered() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = populated_store(tmp.path(), &cache).await;

    let hits = store.search(&cache, "consulta", 10, 1.5).await.unwrap();

    // "opuesto" sits at distance 2.0 and must be dropped.
    assert_eq!(hits.len(), 3);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    for hit in &hits {
        assert!(hit.distance < 1.5);
    }
    assert_eq!(hits[0].text, "muy cerca");
}

#[tokio::test]
async fn test_search_truncates_to_k_before_filtering() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = populated_store(tmp.path(), &cache).await;

    // k = 2 keeps only the two nearest even though "lejos" would also pass
    // the generous threshold.
    let hits = store.search(&cache, "consulta", 2, 1.5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "muy cerca");
    assert_eq!(hits[1].text, "cerca");
}

#[tokio::test]
async fn test_search_monotonic_in_threshold_and_k() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = populated_store(tmp.path(), &cache).await;

    let mut previous = usize::MAX;
    for threshold in [2.5, 1.5, 0.5, 0.1, 0.0001] {
        let hits = store.search(&cache, "consulta", 10, threshold).await.unwrap();
        assert!(hits.len() <= previous, "threshold {} grew results", threshold);
        previous = hits.len();
    }

    let mut previous = 0usize;
    for k in [1, 2, 3, 10] {
        let hits = store.search(&cache, "consulta", k, 2.5).await.unwrap();
        assert!(hits.len() >= previous, "k {} shrank results", k);
        previous = hits.len();
    }
}

#[tokio::test]
async fn test_empty_store_is_a_valid_outcome() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = open_store(tmp.path()).await;

    let hits = store.search(&cache, "consulta", 5, 0.9).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_rebuild_replaces_prior_contents() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = populated_store(tmp.path(), &cache).await;
    assert_eq!(store.count().await.unwrap(), 4);

    store.rebuild(&cache, &[chunk("muy cerca")]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);

    let hits = store.search(&cache, "consulta", 10, 2.5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "muy cerca");
}

#[tokio::test]
async fn test_escalated_search_widens_and_deduplicates() {
    let tmp = TempDir::new().unwrap();
    let cache = open_cache(tmp.path(), Arc::new(catalog_embedder())).await;
    let store = open_store(tmp.path()).await;

    // Identical text indexed twice, plus one distinct neighbor.
    let chunks = vec![chunk("muy cerca"), chunk("muy cerca"), chunk("cerca")];
    store.rebuild(&cache, &chunks).await.unwrap();

    let narrow = store.search(&cache, "consulta", 1, 1.5).await.unwrap();
    assert_eq!(narrow.len(), 1);

    let wide = store
        .search_escalated(&cache, "consulta", 1, 1.5, 3)
        .await
        .unwrap();
    let texts: Vec<&str> = wide.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["muy cerca", "cerca"]);
}
