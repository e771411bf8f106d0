//! Knowledge base error handling
//!
//! Failure taxonomy for ingestion, indexing and retrieval, plus the
//! human-readable messages shown inline to the user.

use std::fmt;
use thiserror::Error;

/// Stage of the ingestion pipeline a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Chunking,
    Embedding,
    Indexing,
}

impl fmt::Display for IngestStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Document is empty")]
    EmptyDocument,

    #[error("No chunks supplied for collection '{collection}'")]
    EmptyInput { collection: String },

    #[error("Knowledge base '{collection}' has not been built yet")]
    NotFound { collection: String },

    #[error("Provider failure: {message}")]
    ProviderFailure { message: String },

    #[error("Failed to write knowledge base '{collection}': {message}")]
    IndexWriteFailure { collection: String, message: String },

    #[error("Invalid collection name: {name:?}")]
    InvalidCollectionName { name: String },

    #[error("Query vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store error: {message}")]
    Store { message: String },

    #[error("Ingestion failed during {stage}: {source}")]
    Ingest {
        stage: IngestStage,
        #[source]
        source: Box<KnowledgeError>,
    },
}

impl KnowledgeError {
    /// Attach the ingestion stage to a failure
    #[inline]
    pub fn at_stage(self, stage: IngestStage) -> Self {
        Self::Ingest {
            stage,
            source: Box::new(self),
        }
    }

    /// Stage an ingestion failure occurred in, if any
    #[inline]
    pub fn stage(&self) -> Option<IngestStage> {
        match self {
            Self::Ingest { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, looking through stage annotations
    #[inline]
    pub fn root(&self) -> &Self {
        match self {
            Self::Ingest { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this only means the knowledge base does not exist yet
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Message suitable for showing inline to the user
    #[inline]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyDocument => {
                "⚠️ The document is empty; nothing to add to the knowledge base.".to_string()
            }
            Self::EmptyInput { .. } => {
                "⚠️ The document produced no text chunks; the knowledge base was not built."
                    .to_string()
            }
            Self::NotFound { .. } => {
                "⚠️ The knowledge base has not been built yet. Ingest a document first."
                    .to_string()
            }
            Self::Ingest { stage, source } => {
                format!("❌ Building the knowledge base failed during {}: {}", stage, source.root())
            }
            other => format!("❌ {}", other),
        }
    }
}
