//! Service adapters for ragprobe
//!
//! This crate implements the collaborator traits over HTTP: an
//! OpenAI-compatible endpoint for chat completions and embeddings, and a
//! hosted search index for ranked search and corpus export.

mod client;
mod config;
mod retry;
mod search;

#[cfg(test)]
mod tests;

pub use client::OpenAiClient;
pub use config::{OpenAiConfig, SearchConfig};
pub use retry::RetryConfig;
pub use search::SearchIndexClient;

// Re-export core types for convenience
pub use ragprobe_core::{Embedder, Error, Generator, Result, SearchService};
