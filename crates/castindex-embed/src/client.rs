//! Ollama HTTP client.

use crate::error::{EmbedError, EmbedResult};
use crate::types::*;
use castindex_config::EmbeddingConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Client for Ollama's model listing and embedding endpoints.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a new client from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> EmbedResult<Self> {
        Self::with_timeout(&config.host, Duration::from_secs(config.timeout_seconds))
    }

    /// Create a new client with default settings.
    pub fn new(host: impl Into<String>) -> EmbedResult<Self> {
        Self::with_timeout(&host.into(), Duration::from_secs(120))
    }

    fn with_timeout(host: &str, timeout: Duration) -> EmbedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EmbedError::Http)?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn send_error(&self, e: reqwest::Error) -> EmbedError {
        if e.is_connect() {
            EmbedError::ServerNotRunning {
                host: self.host.clone(),
            }
        } else if e.is_timeout() {
            EmbedError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            EmbedError::Http(e)
        }
    }

    /// Check if Ollama server is available.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List all available models.
    pub async fn list_models(&self) -> EmbedResult<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.host);
        debug!("Listing models from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(EmbedError::ApiError {
                status,
                message: text,
            });
        }

        let list: ListModelsResponse = response.json().await?;
        Ok(list.models)
    }

    /// Check if a specific model is available.
    pub async fn has_model(&self, model: &str) -> EmbedResult<bool> {
        let models = self.list_models().await?;
        // Accept "bge-m3" for "bge-m3:latest"
        Ok(models
            .iter()
            .any(|m| m.name == model || m.name.starts_with(&format!("{}:", model))))
    }

    /// Generate embeddings for several texts in one request.
    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.host);
        debug!("Embedding {} texts with model {}", texts.len(), model);

        let request = EmbedRequest::new(model, texts.to_vec());
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            if text.contains("not found") || status.as_u16() == 404 {
                return Err(EmbedError::ModelNotFound {
                    model: model.to_string(),
                });
            }

            return Err(EmbedError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let embed_response: EmbedResponse = response.json().await?;
        if embed_response.embeddings.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: embed_response.embeddings.len(),
            });
        }

        Ok(embed_response.embeddings)
    }

    /// Generate an embedding for a single text.
    pub async fn embed(&self, model: &str, text: &str) -> EmbedResult<Vec<f32>> {
        let mut embeddings = self.embed_batch(model, &[text.to_string()]).await?;
        embeddings.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}
