//! Service configuration

use serde::{Deserialize, Serialize};
use std::env;

use ragprobe_core::{Error, Result};

fn required(primary: &str, fallback: &str) -> Result<String> {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .map_err(|_| {
            Error::Configuration(format!(
                "{} or {} environment variable not found",
                primary, fallback
            ))
        })
}

/// Configuration for an OpenAI-compatible model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://my-resource.openai.azure.com/openai/v1`
    pub endpoint: String,
    pub api_key: String,
    pub chat_model: String,
    /// Model used for judging; the chat model when unset
    pub judge_model: Option<String>,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub const DEFAULT_CHAT_MODEL: &'static str = "gpt-4.1";
    pub const DEFAULT_EMBEDDING_MODEL: &'static str = "text-embedding-3-large";

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let endpoint = required("RAGPROBE_LLM_ENDPOINT", "AOAI_ENDPOINT")?;
        let api_key = required("RAGPROBE_LLM_API_KEY", "AOAI_KEY")?;

        let chat_model = env::var("RAGPROBE_CHAT_MODEL")
            .unwrap_or_else(|_| Self::DEFAULT_CHAT_MODEL.to_string());
        let judge_model = env::var("RAGPROBE_JUDGE_MODEL").ok();
        let embedding_model = env::var("RAGPROBE_EMBEDDING_MODEL")
            .unwrap_or_else(|_| Self::DEFAULT_EMBEDDING_MODEL.to_string());

        let timeout_secs = match env::var("RAGPROBE_LLM_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|e| {
                Error::Configuration(format!("RAGPROBE_LLM_TIMEOUT_SECS={:?}: {}", raw, e))
            })?,
            Err(_) => 120,
        };

        Ok(Self {
            endpoint,
            api_key,
            chat_model,
            judge_model,
            embedding_model,
            timeout_secs,
        })
    }

    /// Create configuration with explicit values
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            chat_model: Self::DEFAULT_CHAT_MODEL.to_string(),
            judge_model: None,
            embedding_model: Self::DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: 120,
        }
    }

    pub fn judge_model(&self) -> &str {
        self.judge_model.as_deref().unwrap_or(&self.chat_model)
    }

    /// `{endpoint}/{path}` with exactly one slash in between
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Configuration for a hosted search index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
    pub api_key: String,
    pub api_version: String,
}

impl SearchConfig {
    pub const DEFAULT_API_VERSION: &'static str = "2024-07-01";

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let endpoint = required("RAGPROBE_SEARCH_ENDPOINT", "SEARCH_ENDPOINT")?;
        let index = required("RAGPROBE_SEARCH_INDEX", "SEARCH_INDEX")?;
        let api_key = required("RAGPROBE_SEARCH_API_KEY", "SEARCH_KEY")?;
        let api_version = env::var("RAGPROBE_SEARCH_API_VERSION")
            .unwrap_or_else(|_| Self::DEFAULT_API_VERSION.to_string());

        Ok(Self {
            endpoint,
            index,
            api_key,
            api_version,
        })
    }

    pub fn new(endpoint: impl Into<String>, index: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            index: index.into(),
            api_key: api_key.into(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.index,
            self.api_version
        )
    }
}
