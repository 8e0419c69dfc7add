//! Error taxonomy for the retrieval and conversation pipeline.
//!
//! The variants map directly onto how each fault is handled:
//!
//! - [`Error::Config`] is fatal and raised before any I/O.
//! - [`Error::EmbeddingUnavailable`] / [`Error::ModelUnavailable`] are
//!   external dependency faults; rate-limit-class instances are marked
//!   retryable and handled by the outer backoff policy, never inside the
//!   pipeline itself.
//! - [`Error::Tool`] is recovered locally by the orchestrator (a fixed
//!   user-facing string is substituted for the tool result).
//! - [`Error::Validation`] is recovered locally by keeping the unvalidated
//!   answer (fail open).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, e.g. a chunk overlap that is not smaller than
    /// the chunk size. Always fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding collaborator could not produce a vector.
    #[error("embedding service unavailable: {message}")]
    EmbeddingUnavailable { message: String, retryable: bool },

    /// The language-model collaborator could not produce a completion.
    #[error("language model unavailable: {message}")]
    ModelUnavailable { message: String, retryable: bool },

    /// The retrieval tool failed mid-conversation.
    #[error("tool execution failed: {0}")]
    Tool(String),

    /// The judge call failed or returned output outside the verdict grammar.
    #[error("answer validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the outer backoff policy may retry the whole run.
    ///
    /// Only rate-limit-class faults from the external collaborators qualify;
    /// everything else is either fatal or already recovered locally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::EmbeddingUnavailable { retryable, .. }
            | Error::ModelUnavailable { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
