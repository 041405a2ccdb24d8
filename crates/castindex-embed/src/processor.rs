//! Embedding processor: batching, normalization and tag vectors.

use crate::client::OllamaClient;
use crate::error::{EmbedError, EmbedResult};
use castindex_config::EmbeddingConfig;
use castindex_core::{RetryPolicy, MAX_TAGS};
use std::collections::HashMap;
use std::thread;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// A sentence-embedding model that turns texts into vectors.
pub trait Embedder {
    /// Model identifier written alongside each record.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in order.
    fn embed_batch(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>>;
}

/// Blocking [`Embedder`] backed by an Ollama server.
///
/// The async client is driven from a runtime owned by the embedder, so the
/// model handle is created once and reused for the whole run.
pub struct OllamaEmbedder {
    client: OllamaClient,
    runtime: Runtime,
    model: String,
}

impl OllamaEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> EmbedResult<Self> {
        let client = OllamaClient::from_config(config)?;
        let runtime = Runtime::new().map_err(|e| EmbedError::Runtime(e.to_string()))?;
        Ok(Self {
            client,
            runtime,
            model: config.model.clone(),
        })
    }

    /// Check that the server is reachable and the model is pulled.
    pub fn check(&self) -> EmbedResult<()> {
        if !self.runtime.block_on(self.client.is_available()) {
            return Err(EmbedError::ServerNotRunning {
                host: self.client.host().to_string(),
            });
        }
        if !self.runtime.block_on(self.client.has_model(&self.model))? {
            return Err(EmbedError::ModelNotFound {
                model: self.model.clone(),
            });
        }
        Ok(())
    }
}

impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        self.runtime
            .block_on(self.client.embed_batch(&self.model, texts))
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Produces fixed-dimension normalized vectors for chunks and tags.
pub struct EmbeddingProcessor {
    embedder: Box<dyn Embedder>,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingProcessor {
    pub fn new(embedder: Box<dyn Embedder>, dimension: usize, batch_size: usize) -> Self {
        Self {
            embedder,
            dimension,
            batch_size: batch_size.max(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Build a processor over an Ollama backend.
    pub fn from_config(config: &EmbeddingConfig, retry: RetryPolicy) -> EmbedResult<Self> {
        if config.dimension == 0 {
            return Err(EmbedError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let embedder = OllamaEmbedder::from_config(config)?;
        info!(
            "Embedding with {} at {} ({} dims)",
            config.model, config.host, config.dimension
        );
        Ok(Self::new(Box::new(embedder), config.dimension, config.batch_size).with_retry(retry))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encode one text.
    pub fn encode(&self, text: &str) -> EmbedResult<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()])?;
        vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Encode texts in batches of the configured size.
    pub fn encode_batch(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let raw = self.embed_with_retry(batch)?;
            if raw.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: raw.len(),
                });
            }
            for mut vector in raw {
                if vector.len() != self.dimension {
                    return Err(EmbedError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                l2_normalize(&mut vector);
                vectors.push(vector);
            }
        }
        Ok(vectors)
    }

    /// One vector per tag slot; slots beyond the tags repeat `primary`.
    pub fn tag_vectors(&self, primary: &[f32], tags: &[String]) -> EmbedResult<[Vec<f32>; MAX_TAGS]> {
        let mut slots = self.tag_vectors_batch(&[primary.to_vec()], &[tags.to_vec()])?;
        slots.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Tag slot vectors for many chunks at once.
    ///
    /// `primaries[i]` pads the slots of `tags[i]`. Each distinct tag is
    /// encoded once across the whole call.
    pub fn tag_vectors_batch(
        &self,
        primaries: &[Vec<f32>],
        tags: &[Vec<String>],
    ) -> EmbedResult<Vec<[Vec<f32>; MAX_TAGS]>> {
        if primaries.len() != tags.len() {
            return Err(EmbedError::CountMismatch {
                expected: primaries.len(),
                actual: tags.len(),
            });
        }

        let mut distinct: Vec<String> = Vec::new();
        for tag in tags.iter().flat_map(|t| t.iter().take(MAX_TAGS)) {
            if !distinct.contains(tag) {
                distinct.push(tag.clone());
            }
        }
        let encoded: HashMap<&str, Vec<f32>> = distinct
            .iter()
            .map(String::as_str)
            .zip(self.encode_batch(&distinct)?)
            .collect();

        Ok(primaries
            .iter()
            .zip(tags)
            .map(|(primary, chunk_tags)| {
                let mut vectors = chunk_tags
                    .iter()
                    .take(MAX_TAGS)
                    .filter_map(|tag| encoded.get(tag.as_str()).cloned());
                std::array::from_fn(|_| vectors.next().unwrap_or_else(|| primary.clone()))
            })
            .collect())
    }

    fn embed_with_retry(&self, batch: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let mut retries = 0;
        loop {
            match self.embedder.embed_batch(batch) {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_connection() && self.retry.allows(retries) => {
                    retries += 1;
                    let delay = self.retry.delay(retries);
                    warn!(
                        "Embedding request failed ({}), retry {}/{} in {:?}",
                        err, retries, self.retry.max_retries, delay
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    debug!("Embedding batch of {} failed: {}", batch.len(), err);
                    return Err(err);
                }
            }
        }
    }
}
