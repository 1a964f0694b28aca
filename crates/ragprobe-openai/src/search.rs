//! Search index client (Azure AI Search REST shape)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use ragprobe_core::{Chunk, Error, Result, SearchHit, SearchService};

use crate::config::SearchConfig;

const EXPORT_PAGE_SIZE: usize = 1000;
const CHUNK_FIELDS: &str = "chunk_id,title,chunk,text_vector";

/// Client for `{endpoint}/indexes/{index}/docs/search`
#[derive(Clone)]
pub struct SearchIndexClient {
    config: SearchConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<usize>,
    select: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<Value>,
}

impl SearchIndexClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SearchConfig::from_env()?)
    }

    async fn query(&self, request: &SearchRequest<'_>) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(self.config.search_url())
            .header("Content-Type", "application/json")
            .header("api-key", &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!("search index returned {}", status)));
        }
        if !status.is_success() {
            return Err(Error::Search(format!(
                "search request failed with status {}: {}",
                status, text
            )));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)?;
        Ok(parsed.value)
    }

    /// Page through every document of the index as chunks
    pub async fn export_chunks(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        loop {
            let request = SearchRequest {
                search: "*",
                top: EXPORT_PAGE_SIZE,
                skip: Some(chunks.len()),
                select: CHUNK_FIELDS,
            };
            let page = self.query(&request).await?;
            let page_len = page.len();
            for document in page {
                chunks.push(chunk_from_document(&document)?);
            }
            debug!(exported = chunks.len(), "fetched search page");
            if page_len < EXPORT_PAGE_SIZE {
                break;
            }
        }
        info!(index = %self.config.index, chunks = chunks.len(), "exported corpus");
        Ok(chunks)
    }
}

fn string_field(document: &Value, field: &str) -> Result<String> {
    document
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Search(format!("document is missing string field '{}'", field)))
}

fn hit_from_document(document: &Value) -> Result<SearchHit> {
    Ok(SearchHit {
        chunk_id: string_field(document, "chunk_id")?,
        score: document
            .get("@search.score")
            .and_then(Value::as_f64)
            .map(|s| s as f32),
    })
}

fn chunk_from_document(document: &Value) -> Result<Chunk> {
    let chunk_id = string_field(document, "chunk_id")?;
    let embedding = document
        .get("text_vector")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Search(format!("document '{}' has no text_vector", chunk_id)))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::Search(format!("document '{}' has a non-numeric vector", chunk_id)))
        })
        .collect::<Result<Vec<f32>>>()?;

    Ok(Chunk {
        text: string_field(document, "chunk")?,
        source: document
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        id: chunk_id,
        embedding,
    })
}

#[async_trait]
impl SearchService for SearchIndexClient {
    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            search: query,
            top: top_n,
            skip: None,
            select: "chunk_id",
        };
        self.query(&request)
            .await?
            .iter()
            .map(hit_from_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_url() {
        let config = SearchConfig::new("https://my-search.search.windows.net/", "handbook", "key");
        assert_eq!(
            config.search_url(),
            "https://my-search.search.windows.net/indexes/handbook/docs/search?api-version=2024-07-01"
        );
    }

    #[test]
    fn test_hits_keep_service_order() {
        let documents = [
            json!({"@search.score": 3.5, "chunk_id": "doc_pages_7"}),
            json!({"@search.score": 3.5, "chunk_id": "doc_pages_2"}),
        ];
        let hits: Vec<SearchHit> = documents.iter().map(hit_from_document).collect::<Result<_>>().unwrap();
        assert_eq!(hits[0].chunk_id, "doc_pages_7");
        assert_eq!(hits[1].chunk_id, "doc_pages_2");
        assert_eq!(hits[0].score, Some(3.5));
    }

    #[test]
    fn test_chunk_from_document() {
        let document = json!({
            "chunk_id": "doc_pages_1",
            "title": "handbook.pdf",
            "chunk": "Vacation is 25 days.",
            "text_vector": [0.25, 0.5]
        });
        let chunk = chunk_from_document(&document).unwrap();
        assert_eq!(chunk.id, "doc_pages_1");
        assert_eq!(chunk.source, "handbook.pdf");
        assert_eq!(chunk.embedding, vec![0.25, 0.5]);

        let missing = json!({"chunk_id": "x", "chunk": "t"});
        assert!(matches!(chunk_from_document(&missing), Err(Error::Search(_))));
    }

    #[test]
    fn test_request_body() {
        let request = SearchRequest {
            search: "how many vacation days",
            top: 5,
            skip: None,
            select: "chunk_id",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"search": "how many vacation days", "top": 5, "select": "chunk_id"})
        );
    }
}
