//! Castindex Embed - Embedding generation for transcript chunks.
//!
//! This crate provides an async client for Ollama's embedding API, a blocking
//! [`Embedder`] backend built on it, and the [`EmbeddingProcessor`] that
//! normalizes vectors and derives tag vectors for index records.

mod client;
mod error;
mod processor;
mod types;

pub use client::OllamaClient;
pub use error::{EmbedError, EmbedResult};
pub use processor::{cosine_similarity, l2_normalize, Embedder, EmbeddingProcessor, OllamaEmbedder};
pub use types::*;
