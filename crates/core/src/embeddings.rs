use crate::config::base_url;
use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for an Ollama-compatible `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(endpoint: &str, model: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::new(),
            endpoint: base_url(endpoint)?,
            model: model.into(),
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/api/embeddings", self.endpoint)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let response = self
            .client
            .post(self.embeddings_url())
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: "ollama".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(BackendError::InvalidResponse {
                backend: "ollama".to_string(),
                details: format!("empty embedding returned by model {}", self.model),
            });
        }

        Ok(parsed.embedding)
    }
}
