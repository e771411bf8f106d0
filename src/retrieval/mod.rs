// Retrieval module
// Bridges documents and questions to the on-disk knowledge base

#[cfg(test)]
mod tests;

pub mod errors;

pub use errors::{IngestStage, KnowledgeError};

use crate::database::VectorIndex;
use crate::embeddings::{Embedder, TextChunker, is_zero_vector};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Separator placed between retrieved chunks in a context string
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Knowledge base retrieval options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Collection the knowledge base is stored under
    pub collection_name: String,
    /// Documents longer than this many characters are truncated
    pub max_document_chars: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 3,
            collection_name: "knowledge_base".to_string(),
            max_document_chars: 200_000,
        }
    }
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub chunk_count: usize,
    /// Chunks stored with a zero vector because the provider failed on them
    pub degraded_vectors: usize,
    /// Whether the document was cut at `max_document_chars`
    pub truncated: bool,
}

impl IngestReport {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degraded_vectors > 0
    }
}

impl fmt::Display for IngestReport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "✅ Knowledge base '{}' built from {} chunks",
            self.collection, self.chunk_count
        )?;
        if self.truncated {
            write!(f, " (document truncated)")?;
        }
        if self.degraded_vectors > 0 {
            write!(
                f,
                "; {} chunks could not be embedded and will rank poorly",
                self.degraded_vectors
            )?;
        }
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters
fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => (text.get(..offset).unwrap_or(text), true),
        None => (text, false),
    }
}

/// Ingestion and best-effort retrieval over a single named collection
pub struct RetrievalBridge<E: Embedder> {
    embedder: E,
    index: VectorIndex,
    chunker: TextChunker,
    config: RetrievalConfig,
}

impl<E: Embedder> RetrievalBridge<E> {
    #[inline]
    pub fn new(
        embedder: E,
        index: VectorIndex,
        chunker: TextChunker,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            chunker,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Replace the knowledge base with the contents of `raw_text`.
    ///
    /// Non-incremental: the previous knowledge base stays visible until the
    /// new one is complete and is then discarded. Embedding failures degrade
    /// to zero vectors and are counted in the report.
    #[inline]
    pub async fn ingest(&self, raw_text: &str) -> Result<IngestReport, KnowledgeError> {
        if raw_text.trim().is_empty() {
            return Err(KnowledgeError::EmptyDocument);
        }

        let collection = &self.config.collection_name;
        let (text, truncated) = truncate_chars(raw_text, self.config.max_document_chars);
        if truncated {
            warn!(
                "Document exceeds {} characters; only the first {} are ingested",
                self.config.max_document_chars, self.config.max_document_chars
            );
        }

        // Chunking
        let chunks = self.chunker.split_text(text);
        if chunks.is_empty() {
            return Err(KnowledgeError::EmptyInput {
                collection: collection.clone(),
            }
            .at_stage(IngestStage::Chunking));
        }
        debug!("Document split into {} chunks", chunks.len());

        // Embedding
        let vectors = self.embedder.embed(&chunks);
        self.check_vectors(&chunks, &vectors)
            .map_err(|e| e.at_stage(IngestStage::Embedding))?;
        let degraded_vectors = vectors.iter().filter(|v| is_zero_vector(v)).count();
        if degraded_vectors > 0 {
            warn!(
                "{} of {} chunks were stored with zero vectors",
                degraded_vectors,
                chunks.len()
            );
        }

        // Indexing
        let chunk_count = self
            .index
            .rebuild(&chunks, &vectors, collection)
            .await
            .map_err(|e| e.at_stage(IngestStage::Indexing))?;

        info!(
            "Ingested document into '{}': {} chunks, {} degraded",
            collection, chunk_count, degraded_vectors
        );

        Ok(IngestReport {
            collection: collection.clone(),
            chunk_count,
            degraded_vectors,
            truncated,
        })
    }

    fn check_vectors(&self, chunks: &[String], vectors: &[Vec<f32>]) -> Result<(), KnowledgeError> {
        if vectors.len() != chunks.len() {
            return Err(KnowledgeError::ProviderFailure {
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            });
        }

        let dimension = self.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(KnowledgeError::ProviderFailure {
                message: format!(
                    "embedder returned a {}-dimensional vector, expected {}",
                    bad.len(),
                    dimension
                ),
            });
        }

        Ok(())
    }

    /// Context string for `question` built from the `k` nearest chunks.
    ///
    /// Never fails: blank questions, a missing knowledge base and any
    /// embedding or index error all yield an empty string.
    #[inline]
    pub async fn retrieve(&self, question: &str, k: usize) -> String {
        if question.trim().is_empty() {
            return String::new();
        }

        match self.search(question, k).await {
            Ok(chunks) => {
                debug!("Retrieved {} chunks for question", chunks.len());
                chunks.join(CONTEXT_SEPARATOR)
            }
            Err(e) if e.is_not_found() => {
                debug!("Knowledge base not built yet; answering without context");
                String::new()
            }
            Err(e) => {
                warn!("Retrieval failed, answering without context: {}", e);
                String::new()
            }
        }
    }

    /// Raw nearest chunks for `question`, surfacing failures
    #[inline]
    pub async fn search(&self, question: &str, k: usize) -> Result<Vec<String>, KnowledgeError> {
        let query_vector = self.embedder.embed_one(question);
        self.index
            .search(&query_vector, k, &self.config.collection_name)
            .await
    }

    /// Whether the knowledge base has been built
    #[inline]
    pub async fn is_ready(&self) -> bool {
        match self.index.exists(&self.config.collection_name).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Could not check knowledge base status: {}", e);
                false
            }
        }
    }
}
