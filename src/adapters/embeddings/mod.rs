//! Embedding provider adapters (C2).

pub mod openai;

pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
