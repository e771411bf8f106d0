
use super::{CollectionManifest, is_valid_collection_name};
use crate::retrieval::KnowledgeError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MANIFEST_SUFFIX: &str = ".active.json";
const GENERATION_ID_LEN: usize = 32;

/// On-disk knowledge base collections backed by LanceDB.
///
/// Each rebuild writes a new generation table named `<collection>-<uuid>`
/// and then swaps `<collection>.active.json` to point at it, so readers see
/// either the previous complete generation or the new one.
pub struct VectorIndex {
    connection: Connection,
    root: PathBuf,
}

/// A raw nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
struct SearchHit {
    chunk_index: u32,
    content: String,
    distance: f32,
}

fn store_error(message: String) -> KnowledgeError {
    KnowledgeError::Store { message }
}

fn write_failure(collection: &str, message: String) -> KnowledgeError {
    KnowledgeError::IndexWriteFailure {
        collection: collection.to_string(),
        message,
    }
}

/// Whether `table` is a generation table of `collection`
fn is_generation_of(table: &str, collection: &str) -> bool {
    table
        .strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|id| id.len() == GENERATION_ID_LEN && id.chars().all(|c| c.is_ascii_hexdigit()))
}

impl VectorIndex {
    /// Open (creating if needed) the vector index directory
    #[inline]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let root = root.as_ref().to_path_buf();
        debug!("Initializing LanceDB at path: {:?}", root);

        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            store_error(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = root.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| store_error(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Vector index opened at {:?}", root);
        Ok(Self { connection, root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}{}", collection, MANIFEST_SUFFIX))
    }

    fn check_name(collection: &str) -> Result<(), KnowledgeError> {
        if is_valid_collection_name(collection) {
            Ok(())
        } else {
            Err(KnowledgeError::InvalidCollectionName {
                name: collection.to_string(),
            })
        }
    }

    /// Read the active-generation pointer of a collection
    #[inline]
    pub async fn manifest(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionManifest>, KnowledgeError> {
        Self::check_name(collection)?;

        let path = self.manifest_path(collection);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(store_error(format!(
                    "Failed to read collection manifest {:?}: {}",
                    path, e
                )));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| store_error(format!("Corrupt collection manifest {:?}: {}", path, e)))
    }

    /// Atomically replace the active-generation pointer
    async fn write_manifest(&self, manifest: &CollectionManifest) -> Result<(), KnowledgeError> {
        let json = serde_json::to_string_pretty(manifest).map_err(|e| {
            write_failure(
                &manifest.collection,
                format!("Failed to serialize manifest: {}", e),
            )
        })?;

        let temp_path = self.root.join(format!(
            ".{}.{}.tmp",
            manifest.collection,
            Uuid::new_v4().simple()
        ));
        let final_path = self.manifest_path(&manifest.collection);

        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            write_failure(
                &manifest.collection,
                format!("Failed to write manifest: {}", e),
            )
        })?;

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(write_failure(
                &manifest.collection,
                format!("Failed to activate manifest: {}", e),
            ));
        }

        Ok(())
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
        ]))
    }

    /// Create a RecordBatch from chunks and their vectors
    fn create_record_batch(
        chunks: &[String],
        vectors: &[Vec<f32>],
        vector_dim: i32,
    ) -> Result<RecordBatch, String> {
        let indices = (0..chunks.len())
            .map(u32::try_from)
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|e| format!("Too many chunks: {}", e))?;
        let contents: Vec<&str> = chunks.iter().map(String::as_str).collect();

        let flat_values: Vec<f32> = vectors.iter().flatten().copied().collect();
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim, Arc::new(values_array), None)
                .map_err(|e| format!("Failed to create vector array: {}", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt32Array::from(indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| format!("Failed to create record batch: {}", e))
    }

    /// Write one complete generation table
    async fn write_generation(
        &self,
        table_name: &str,
        batch: RecordBatch,
        expected_rows: usize,
    ) -> Result<(), String> {
        let schema = batch.schema();
        let table = self
            .connection
            .create_empty_table(table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| format!("Failed to create table: {}", e))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| format!("Failed to insert chunks: {}", e))?;

        let written = table
            .count_rows(None)
            .await
            .map_err(|e| format!("Failed to verify written rows: {}", e))?;
        if written != expected_rows {
            return Err(format!(
                "Wrote {} rows but expected {}",
                written, expected_rows
            ));
        }

        Ok(())
    }

    async fn drop_table_quietly(&self, table_name: &str) {
        if let Err(e) = self.connection.drop_table(table_name).await {
            warn!("Failed to drop table {}: {}", table_name, e);
        }
    }

    async fn generation_tables(&self, collection: &str) -> Result<Vec<String>, KnowledgeError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error(format!("Failed to list tables: {}", e)))?;

        Ok(table_names
            .into_iter()
            .filter(|table| is_generation_of(table, collection))
            .collect())
    }

    /// Drop every generation of `collection` except `keep`
    async fn sweep_generations(&self, collection: &str, keep: &str) {
        match self.generation_tables(collection).await {
            Ok(tables) => {
                for table in tables.iter().filter(|table| table.as_str() != keep) {
                    debug!("Dropping stale generation {}", table);
                    self.drop_table_quietly(table).await;
                }
            }
            Err(e) => warn!("Could not sweep stale generations of {}: {}", collection, e),
        }
    }

    /// Replace the contents of `collection` with the given chunks.
    ///
    /// The previous generation stays active until the new one is fully
    /// written; it is dropped afterwards. Returns the number of chunks written.
    #[inline]
    pub async fn rebuild(
        &self,
        chunks: &[String],
        vectors: &[Vec<f32>],
        collection: &str,
    ) -> Result<usize, KnowledgeError> {
        Self::check_name(collection)?;

        if chunks.is_empty() {
            return Err(KnowledgeError::EmptyInput {
                collection: collection.to_string(),
            });
        }

        if chunks.len() != vectors.len() {
            return Err(write_failure(
                collection,
                format!(
                    "{} chunks but {} vectors supplied",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(write_failure(
                collection,
                "Vectors must not be empty".to_string(),
            ));
        }
        if let Some(position) = vectors.iter().position(|vector| vector.len() != dimension) {
            return Err(write_failure(
                collection,
                format!(
                    "Vector {} has {} dimensions, expected {}",
                    position,
                    vectors[position].len(),
                    dimension
                ),
            ));
        }
        let vector_dim = i32::try_from(dimension).map_err(|_| {
            write_failure(collection, format!("Dimension {} is too large", dimension))
        })?;

        let table_name = format!("{}-{}", collection, Uuid::new_v4().simple());
        debug!(
            "Writing {} chunks ({} dimensions) into generation {}",
            chunks.len(),
            dimension,
            table_name
        );

        let batch = Self::create_record_batch(chunks, vectors, vector_dim)
            .map_err(|message| write_failure(collection, message))?;

        if let Err(message) = self
            .write_generation(&table_name, batch, chunks.len())
            .await
        {
            self.drop_table_quietly(&table_name).await;
            return Err(write_failure(collection, message));
        }

        let manifest = CollectionManifest {
            collection: collection.to_string(),
            table: table_name.clone(),
            chunk_count: chunks.len(),
            dimension,
            built_at: Utc::now(),
        };
        if let Err(e) = self.write_manifest(&manifest).await {
            self.drop_table_quietly(&table_name).await;
            return Err(e);
        }

        self.sweep_generations(collection, &table_name).await;

        info!(
            "Knowledge base '{}' rebuilt with {} chunks",
            collection,
            chunks.len()
        );
        Ok(chunks.len())
    }

    /// Nearest chunks to `query_vector`, nearest first, at most `k`
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        collection: &str,
    ) -> Result<Vec<String>, KnowledgeError> {
        let manifest = self
            .manifest(collection)
            .await?
            .ok_or_else(|| KnowledgeError::NotFound {
                collection: collection.to_string(),
            })?;

        if k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != manifest.dimension {
            return Err(KnowledgeError::DimensionMismatch {
                expected: manifest.dimension,
                actual: query_vector.len(),
            });
        }

        debug!(
            "Searching '{}' ({}) for {} nearest chunks",
            collection, manifest.table, k
        );

        let table = match self.connection.open_table(&manifest.table).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                warn!(
                    "Manifest for '{}' points at missing table {}",
                    collection, manifest.table
                );
                return Err(KnowledgeError::NotFound {
                    collection: collection.to_string(),
                });
            }
            Err(e) => return Err(store_error(format!("Failed to open table: {}", e))),
        };

        let results = table
            .vector_search(query_vector)
            .map_err(|e| store_error(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| store_error(format!("Failed to execute search: {}", e)))?;

        let mut hits = Self::parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(k);

        Ok(hits.into_iter().map(|hit| hit.content).collect())
    }

    /// Parse search results from LanceDB stream
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchHit>, KnowledgeError> {
        let mut hits = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| store_error(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search hits from stream", hits.len());
        Ok(hits)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>, KnowledgeError> {
        let contents = batch
            .column_by_name("content")
            .ok_or_else(|| store_error("Missing content column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| store_error("Invalid content column type".to_string()))?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| store_error("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| store_error("Invalid chunk_index column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let hits = (0..batch.num_rows())
            .map(|row| SearchHit {
                chunk_index: chunk_indices.value(row),
                content: contents.value(row).to_string(),
                distance: distances.map_or(0.0, |d| {
                    if d.is_null(row) { f32::MAX } else { d.value(row) }
                }),
            })
            .collect();

        Ok(hits)
    }

    /// Whether `collection` resolves to a built generation
    #[inline]
    pub async fn exists(&self, collection: &str) -> Result<bool, KnowledgeError> {
        let Some(manifest) = self.manifest(collection).await? else {
            return Ok(false);
        };

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&manifest.table))
    }

    /// Number of chunks stored in the active generation
    #[inline]
    pub async fn count(&self, collection: &str) -> Result<usize, KnowledgeError> {
        let manifest = self
            .manifest(collection)
            .await?
            .ok_or_else(|| KnowledgeError::NotFound {
                collection: collection.to_string(),
            })?;

        let table = self
            .connection
            .open_table(&manifest.table)
            .execute()
            .await
            .map_err(|e| store_error(format!("Failed to open table: {}", e)))?;

        table
            .count_rows(None)
            .await
            .map_err(|e| store_error(format!("Failed to count rows: {}", e)))
    }

    /// Remove a collection and all of its generations.
    ///
    /// Returns whether anything was removed; a missing collection is not an error.
    #[inline]
    pub async fn drop_collection(&self, collection: &str) -> Result<bool, KnowledgeError> {
        Self::check_name(collection)?;

        let mut removed = match tokio::fs::remove_file(self.manifest_path(collection)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(store_error(format!(
                    "Failed to remove manifest for '{}': {}",
                    collection, e
                )));
            }
        };

        for table in self.generation_tables(collection).await? {
            self.connection
                .drop_table(&table)
                .await
                .map_err(|e| store_error(format!("Failed to drop table {}: {}", table, e)))?;
            removed = true;
        }

        if removed {
            info!("Dropped knowledge base '{}'", collection);
        }
        Ok(removed)
    }
}
