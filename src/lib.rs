//! # Viajero
//!
//! A retrieval-augmented question answering agent for travel catalogs.
//!
//! Viajero indexes a directory of catalog documents into a persistent vector
//! store, retrieves the passages closest to a question, and drives a
//! tool-calling conversation with a language model that answers only from
//! the retrieved context. A second judge call checks each answer; rejected
//! answers trigger one wider retrieval pass before the answer is final.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Catalog  │──▶│ Chunk + Embed │──▶│   SQLite    │
//! │ (*.md)   │   │  (cached)     │   │ cache+store │
//! └──────────┘   └───────────────┘   └──────┬──────┘
//!                                           │ search
//!                ┌──────────────┐    ┌──────┴──────┐
//!                │ Conversation │───▶│  Retrieval  │
//!                │ orchestrator │◀───│    tool     │
//!                └──────┬───────┘    └─────────────┘
//!                       │ validate / escalate
//!                       ▼
//!                  final answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration plus validation |
//! | [`models`] | Core data types |
//! | [`catalog`] | Document source (catalog directory) |
//! | [`chunk`] | Overlapping fixed-window chunker |
//! | [`cache`] | Content-addressed embedding cache |
//! | [`store`] | Vector store and nearest-neighbor retriever |
//! | [`prompt`] | Grounded-answer prompt assembly |
//! | [`protocol`] | Tool-call / verdict grammar |
//! | [`agent`] | Conversation orchestrator and backoff |
//! | [`embedding`] | Embedding collaborator + vector utilities |
//! | [`llm`] | Language-model collaborator |
//! | [`context`] | Per-process runtime context |
//! | [`db`] | Database connection |

pub mod agent;
pub mod cache;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod protocol;
pub mod store;
