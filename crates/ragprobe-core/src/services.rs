//! Traits for the external services the evaluation core consumes
//!
//! Every call through these traits is a suspension point; everything else in
//! the core is synchronous. Implementations must be `Send + Sync` so they can
//! be shared across concurrently running record tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{GroundednessVerdict, Result};

/// Request sent to a text generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the service for a JSON object response
    pub json_response: bool,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: None,
            temperature: None,
            json_response: false,
        }
    }

    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Strip a surrounding markdown code fence from a service reply, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest.strip_prefix("json").unwrap_or(rest),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// A ranked hit from the search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: Option<f32>,
}

/// What a judge needs to score one answer
#[derive(Debug, Clone)]
pub struct JudgeRequest<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    /// Texts of the chunks the answer was allowed to use
    pub context: &'a [String],
    pub expected_answer: &'a str,
    /// Whether the question is answerable from `context`
    pub is_grounded: bool,
}

/// Embedding service. Must be stable: the same text yields the same (or a
/// near-identical) vector across calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Text generation service (question synthesis, fixed-context answering)
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion. May be non-deterministic.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Model identifier used for reports and logs
    fn model_id(&self) -> &str;
}

/// Search service queried by the retrieval metrics engine
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Return up to `top_n` chunk ids in the service's own rank order
    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>>;
}

/// Groundedness judge
#[async_trait]
pub trait Judge: Send + Sync {
    async fn score(&self, request: &JudgeRequest<'_>) -> Result<GroundednessVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }
}
