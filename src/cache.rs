//! Content-addressed embedding cache.
//!
//! Vectors are stored in SQLite keyed by `(text_hash, model)` where the hash
//! is SHA-256 hex of the exact text. Identical text from different documents
//! shares one entry; entries are written once and never updated or deleted.
//! Keying on the model name as well means switching embedding models starts
//! a fresh namespace instead of silently serving vectors from the old one.
//!
//! A miss calls the [`Embedder`] collaborator exactly once and inserts the
//! result. Failed embedding calls propagate and are never cached. Concurrent
//! misses for the same key may both compute and insert; the value is
//! deterministic for a fixed model, so last-write-wins is harmless.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::error::Result;

pub struct EmbeddingCache {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let pool = db::connect(path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                text_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (text_hash, model)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        tracing::debug!(
            model = embedder.model_name(),
            dims = embedder.dims(),
            "embedding cache ready"
        );
        Ok(Self { pool, embedder })
    }

    /// Return the embedding for `text`, computing and storing it on a miss.
    ///
    /// Cache hits return the stored vector unchanged; no re-validation
    /// against the current model version happens beyond the model name in
    /// the key.
    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let hash = hash_text(text);
        let model = self.embedder.model_name();

        let cached: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT embedding FROM embedding_cache WHERE text_hash = ? AND model = ?",
        )
        .bind(&hash)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(blob) = cached {
            tracing::debug!(hash = %hash, "embedding cache hit");
            return Ok(blob_to_vec(&blob));
        }

        let vector = self.embedder.embed(text).await?;

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO embedding_cache (text_hash, model, text, embedding, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&hash)
        .bind(model)
        .bind(text)
        .bind(vec_to_blob(&vector))
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(hash = %hash, "embedding cached");
        Ok(vector)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// SHA-256 hex digest of a chunk or query text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_content_addressed() {
        let a = hash_text("Incluye vuelo y 3 noches de hotel");
        let b = hash_text("Incluye vuelo y 3 noches de hotel");
        let c = hash_text("Incluye vuelo y 4 noches de hotel");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
