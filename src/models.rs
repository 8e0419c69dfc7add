//! Core data types used throughout the retrieval and conversation pipeline.

use serde::Serialize;

/// A named text document loaded from the catalog directory.
///
/// Immutable once loaded; `title` is the provenance label stamped into each
/// chunk (the filename, or a mapped display title from configuration).
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub title: String,
    pub body: String,
}

/// A bounded window of document text, prefixed with its provenance line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window text including the leading `ARCHIVO:` provenance line.
    pub text: String,
    /// Provenance label of the source document.
    pub source: String,
    /// Zero-based window index within the source document.
    pub index: usize,
}

/// A retrieval match: chunk text plus its cosine distance to the query.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub text: String,
    pub distance: f64,
}

/// Message roles understood by the chat-completions wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged turn of a model conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
