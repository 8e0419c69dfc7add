//! Persistent vector store and nearest-neighbor retriever.
//!
//! Rows are `(text, embedding)` pairs keyed by insertion order; the store is
//! append-only and replaced wholesale by [`VectorStore::rebuild`]. Search
//! embeds the query through the cache, ranks every stored vector by cosine
//! distance, keeps the `max_results` nearest, and drops anything at or
//! beyond the distance threshold. An empty result is a valid outcome, not a
//! fault.

use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::cache::EmbeddingCache;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::Result;
use crate::models::{Chunk, RetrievalHit};

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Rebuild the store from scratch: drop every prior row, then insert one
    /// row per chunk, fetching vectors through the embedding cache.
    ///
    /// All-or-nothing from the caller's perspective but not internally
    /// atomic: a failure mid-way leaves a partially populated store, and the
    /// recovery is to rerun with force. Concurrent rebuilds must be
    /// serialized by the caller.
    pub async fn rebuild(&self, cache: &EmbeddingCache, chunks: &[Chunk]) -> Result<u64> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;

        let mut stored = 0u64;
        for chunk in chunks {
            let vector = cache.get_embedding(&chunk.text).await?;
            sqlx::query("INSERT INTO chunks (text, embedding) VALUES (?, ?)")
                .bind(&chunk.text)
                .bind(vec_to_blob(&vector))
                .execute(&self.pool)
                .await?;
            stored += 1;
            tracing::debug!(source = %chunk.source, index = chunk.index, "chunk indexed");
            if stored % 50 == 0 {
                tracing::info!(stored, total = chunks.len(), "indexing progress");
            }
        }

        tracing::info!(chunks = stored, "vector store rebuilt");
        Ok(stored)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// k-nearest-neighbor search with a distance cutoff.
    ///
    /// Returns hits sorted ascending by distance; every returned distance is
    /// strictly below `max_distance`.
    pub async fn search(
        &self,
        cache: &EmbeddingCache,
        query: &str,
        max_results: usize,
        max_distance: f64,
    ) -> Result<Vec<RetrievalHit>> {
        let query_vec = cache.get_embedding(query).await?;

        let rows = sqlx::query("SELECT text, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<RetrievalHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RetrievalHit {
                    text: row.get("text"),
                    distance: cosine_distance(&query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(max_results);
        hits.retain(|hit| hit.distance < max_distance);

        tracing::debug!(query, hits = hits.len(), "retrieval pass");
        Ok(hits)
    }

    /// The widened retrieval pass used after a failed validation: considers
    /// `max_results × passes` candidate passages and deduplicates by text.
    pub async fn search_escalated(
        &self,
        cache: &EmbeddingCache,
        query: &str,
        max_results: usize,
        max_distance: f64,
        passes: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let widened = max_results.saturating_mul(passes.max(1));
        let mut hits = self.search(cache, query, widened, max_distance).await?;

        let mut seen = std::collections::HashSet::new();
        hits.retain(|hit| seen.insert(hit.text.clone()));

        Ok(hits)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
