//! Overlapping fixed-window text chunker.
//!
//! Splits a document body into windows of `chunk_size` characters where
//! consecutive windows share `overlap` characters: window `i` starts at
//! character position `i × (chunk_size − overlap)`. A text of `L` characters
//! therefore yields `⌈(L − overlap) / (chunk_size − overlap)⌉` windows (zero
//! for empty text), and the final window may be shorter than `chunk_size`.
//!
//! Each window is prefixed with an `ARCHIVO:` provenance line naming the
//! source document, so retrieval results stay attributable after the windows
//! are separated from their documents.
//!
//! Offsets are counted in characters, not bytes; a window boundary never
//! lands inside a multi-byte UTF-8 sequence.

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Validated chunking parameters.
///
/// Construction enforces `chunk_size > overlap`; an overlap at or above the
/// chunk size would make the window stride zero or negative and the sequence
/// would never advance.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkPolicy {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Split `text` into provenance-tagged windows.
    ///
    /// The returned iterator is lazy and restartable: it borrows `text`,
    /// holds no external state, and a fresh call yields the same sequence.
    /// An empty `source` label suppresses the provenance line.
    pub fn split<'a>(&self, text: &'a str, source: &str) -> Chunks<'a> {
        Chunks {
            text,
            source: source.to_string(),
            chunk_size: self.chunk_size,
            stride: self.chunk_size - self.overlap,
            start: 0,
            index: 0,
        }
    }
}

/// Iterator over the windows of one document. Created by [`ChunkPolicy::split`].
pub struct Chunks<'a> {
    text: &'a str,
    source: String,
    chunk_size: usize,
    stride: usize,
    /// Byte offset of the next window start; `text.len()` once exhausted.
    start: usize,
    index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.start >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.start..];

        // Walk characters once to find both the window end and the byte
        // offset of the next window start (`stride` characters in).
        let mut end = rest.len();
        let mut next_start = None;
        for (seen, (pos, _)) in rest.char_indices().enumerate() {
            if seen == self.stride {
                next_start = Some(self.start + pos);
            }
            if seen == self.chunk_size {
                end = pos;
                break;
            }
        }

        let window = &rest[..end];
        let text = if self.source.is_empty() {
            window.to_string()
        } else {
            format!("ARCHIVO: {}\n{}", self.source, window)
        };

        let chunk = Chunk {
            text,
            source: self.source.clone(),
            index: self.index,
        };
        self.index += 1;

        // The window that reaches the end of the text is the last one; a
        // further window would contain only already-covered characters.
        if end == rest.len() {
            self.start = self.text.len();
        } else {
            self.start = next_start.unwrap_or(self.text.len());
        }

        Some(chunk)
    }
}
