//! OpenAI-compatible chat and embedding client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use ragprobe_core::{Embedder, Error, GenerationRequest, Generator, Result};

use crate::config::OpenAiConfig;
use crate::retry::{RetryConfig, retrying};

/// Client for `/chat/completions` and `/embeddings`
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    current_model: String,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatMessageContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageContent,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            current_model: config.chat_model.clone(),
            config,
            client,
            retry: RetryConfig::default(),
        })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OpenAiConfig::from_env()?;
        Self::new(config)
    }

    /// Set the chat model used for generation
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.current_model = model_id.into();
        self
    }

    /// Set the retry policy for timeouts and network failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// A copy of this client generating with the configured judge model
    pub fn judge(&self) -> Self {
        self.clone().with_model(self.config.judge_model())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn chat_body<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.current_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_completion_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_response.then_some(ResponseFormat { kind: "json_object" }),
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        retrying(&self.retry, path, || self.post_once(path, body)).await
    }

    async fn post_once<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let url = self.config.url(path);
        let send = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send();

        let response = match timeout(Duration::from_secs(self.config.timeout_secs), send).await {
            Ok(result) => result.map_err(|e| Error::Network(e.to_string()))?,
            Err(_) => return Err(Error::Timeout(format!("request to {} timed out", url))),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!("{} returned {}", path, status)));
        }
        if !status.is_success() {
            return Err(Error::Generation(format!(
                "{} request failed with status {}: {}",
                path, status, text
            )));
        }
        Ok(text)
    }
}

fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::Generation("empty completion".to_string()))
}

fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbeddingResponse = serde_json::from_str(body)?;
    parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| Error::Generation("empty embedding response".to_string()))
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(model = %self.current_model, json = request.json_response, "chat completion");
        let body = self.post("chat/completions", &self.chat_body(request)).await?;
        parse_chat_response(&body)
    }

    fn model_id(&self) -> &str {
        &self.current_model
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let body = self.post("embeddings", &request).await?;
        parse_embedding_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        let mut config = OpenAiConfig::new("https://example.openai.azure.com/openai/v1/", "key");
        config.judge_model = Some("judge-model".to_string());
        OpenAiClient::new(config).unwrap()
    }

    #[test]
    fn test_chat_body_shape() {
        let client = client();
        let request = GenerationRequest::new("sys", "usr").with_json_response().with_max_tokens(50);
        let body = serde_json::to_value(client.chat_body(&request)).unwrap();

        assert_eq!(body["model"], OpenAiConfig::DEFAULT_CHAT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_completion_tokens"], 50);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_judge_uses_judge_model() {
        let judge = client().judge();
        assert_eq!(judge.model_id(), "judge-model");
    }

    #[test]
    fn test_retry_policy_is_configurable() {
        assert_eq!(client().retry, RetryConfig::default());
        let client = client().with_retry(RetryConfig::disabled());
        assert_eq!(client.retry.max_attempts, 1);
        assert_eq!(client.judge().retry.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_network_error() {
        let config = OpenAiConfig::new("http://127.0.0.1:9", "key");
        let client = OpenAiClient::new(config).unwrap().with_retry(RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        });
        let result = client.embed("hello").await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[test]
    fn test_url_join() {
        assert_eq!(
            client().config().url("/chat/completions"),
            "https://example.openai.azure.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_responses() {
        let chat = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"a\": 1}"}}]}"#;
        assert_eq!(parse_chat_response(chat).unwrap(), "{\"a\": 1}");

        let empty = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert!(matches!(parse_chat_response(empty), Err(Error::Generation(_))));

        let embedding = r#"{"data": [{"index": 0, "embedding": [0.5, -0.25]}], "model": "m"}"#;
        assert_eq!(parse_embedding_response(embedding).unwrap(), vec![0.5, -0.25]);

        assert!(matches!(parse_chat_response("<html>"), Err(Error::Serialization(_))));
    }
}
