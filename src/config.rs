use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Directory holding the travel-catalog documents.
    #[serde(default = "default_catalog_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Optional filename → display title mapping for provenance lines.
    #[serde(default)]
    pub titles: HashMap<String, String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: default_catalog_root(),
            include_globs: default_include_globs(),
            titles: HashMap::new(),
        }
    }
}

fn default_catalog_root() -> PathBuf {
    PathBuf::from("./catalogo")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            store_path: default_store_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/embedding_cache.db")
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/embeddings.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Characters per window.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive windows. Must stay below `chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Hits at or beyond this cosine distance are dropped.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    /// Candidate-pool multiplier for the escalated pass.
    #[serde(default = "default_escalation_passes")]
    pub escalation_passes: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_distance: default_max_distance(),
            escalation_passes: default_escalation_passes(),
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_max_distance() -> f64 {
    0.9
}
fn default_escalation_passes() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackoffConfig {
    /// Whole-run retries on rate-limit-class faults.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_jitter_ms() -> u64 {
    500
}

impl Config {
    /// Reject invalid combinations before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.max_results < 1 {
            return Err(Error::Config("retrieval.max_results must be >= 1".into()));
        }
        if self.retrieval.max_distance <= 0.0 {
            return Err(Error::Config("retrieval.max_distance must be > 0".into()));
        }
        if self.retrieval.escalation_passes < 1 {
            return Err(Error::Config(
                "retrieval.escalation_passes must be >= 1".into(),
            ));
        }
        if self.embedding.dims == 0 {
            return Err(Error::Config("embedding.dims must be > 0".into()));
        }
        Ok(())
    }
}

/// Load the TOML configuration file, falling back to defaults when the file
/// does not exist. Validation runs separately (after CLI overrides).
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_stay_below_chunk_size() {
        let mut config = Config::default();
        config.chunking.chunk_size = 200;
        config.chunking.overlap = 200;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.chunking.overlap = 199;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500

            [retrieval]
            max_distance = 0.7

            [catalog.titles]
            "roma.md" = "Escapada a Roma"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 200);
        assert!((config.retrieval.max_distance - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.retrieval.max_results, 5);
        assert_eq!(
            config.catalog.titles.get("roma.md").map(String::as_str),
            Some("Escapada a Roma")
        );
    }

    #[test]
    fn test_zero_max_results_rejected() {
        let mut config = Config::default();
        config.retrieval.max_results = 0;
        assert!(config.validate().is_err());
    }
}
