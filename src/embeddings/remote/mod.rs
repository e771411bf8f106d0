
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{Embedder, zero_vector};
use crate::config::ProviderConfig;
use crate::provider::ProviderClient;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Embedding adapter for the hosted `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    provider: ProviderClient,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider =
            ProviderClient::new(config).context("Failed to initialize provider client")?;
        Ok(Self::from_provider(provider, config))
    }

    #[inline]
    pub fn from_provider(provider: ProviderClient, config: &ProviderConfig) -> Self {
        Self {
            provider,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch in one request; any failure fails the whole batch
    #[inline]
    pub fn try_embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .provider
            .post_json("embeddings", &request_json)
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        if response.data.iter().all(|item| item.index.is_some()) {
            response.data.sort_by_key(|item| item.index);
        }

        Ok(response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }

    /// Keep a vector only if it has the configured dimensionality
    fn checked(&self, vector: Vec<f32>) -> Vec<f32> {
        if vector.len() == self.dimension {
            vector
        } else {
            error!(
                "Provider returned a {}-dimensional vector, expected {}; using zero vector",
                vector.len(),
                self.dimension
            );
            zero_vector(self.dimension)
        }
    }

    fn embed_item(&self, text: &str) -> Vec<f32> {
        match self.try_embed_batch(&[text.to_string()]) {
            Ok(mut vectors) => vectors
                .pop()
                .map_or_else(|| zero_vector(self.dimension), |vector| self.checked(vector)),
            Err(e) => {
                error!(
                    "Failed to embed text ({} chars), using zero vector: {:#}",
                    text.chars().count(),
                    e
                );
                zero_vector(self.dimension)
            }
        }
    }
}

impl Embedder for EmbeddingClient {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            if batch.len() == 1 {
                vectors.extend(batch.iter().map(|text| self.embed_item(text)));
                continue;
            }

            match self.try_embed_batch(batch) {
                Ok(batch_vectors) => {
                    vectors.extend(batch_vectors.into_iter().map(|vector| self.checked(vector)));
                }
                Err(e) => {
                    warn!(
                        "Batch of {} texts failed, retrying one at a time: {:#}",
                        batch.len(),
                        e
                    );
                    vectors.extend(batch.iter().map(|text| self.embed_item(text)));
                }
            }
        }

        debug!("Produced {} embeddings", vectors.len());
        vectors
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Vec<f32> {
        self.embed_item(text)
    }
}
