// LanceDB vector database module
// Knowledge base collections and similarity search


pub mod vector_store;

pub use vector_store::VectorIndex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pointer to the generation table that currently backs a collection.
///
/// Written only after the generation is fully built, so a collection either
/// resolves to a complete table or does not exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionManifest {
    /// Logical collection name, e.g. `knowledge_base`
    pub collection: String,
    /// LanceDB table holding this generation
    pub table: String,
    /// Number of chunks written
    pub chunk_count: usize,
    /// Length of every stored vector
    pub dimension: usize,
    /// When this generation became active
    pub built_at: DateTime<Utc>,
}

/// Collection names become table names and file names
#[inline]
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
