//! Core traits and types for ragprobe
//!
//! This crate defines the data model of the synthetic evaluation engine
//! (chunks, neighbor sets, synthetic records, verdicts), the narrow traits
//! through which it talks to external embedding, generation, search and
//! judging services, and the local building blocks shared by every stage:
//! the exact similarity index, the neighbor selector and bounded fan-out.

pub mod config;
pub mod corpus;
pub mod error;
pub mod fanout;
pub mod neighbors;
pub mod services;
pub mod similarity;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{EvalConfig, ValidatorConfig, Vocabularies, Vocabulary};
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use fanout::{CancelToken, FanOut, fan_out};
pub use neighbors::NeighborSelector;
pub use services::{
    Embedder, GenerationRequest, Generator, Judge, JudgeRequest, SearchHit, SearchService,
    strip_code_fence,
};
pub use similarity::{SimilarityIndex, cosine_similarity};
pub use types::*;
