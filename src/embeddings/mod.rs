// Embeddings module
// Text chunking and the remote embedding provider

pub mod chunking;
pub mod remote;
#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{Chunk, ChunkingConfig, Chunks, TextChunker};
pub use remote::EmbeddingClient;

/// Converts text into fixed-length vectors.
///
/// Implementations never fail: an input the provider could not embed is
/// returned as a zero vector of [`Embedder::dimension`] length, so callers
/// must tolerate degraded vectors.
pub trait Embedder: Send + Sync {
    /// Length of every vector produced by this embedder
    fn dimension(&self) -> usize;

    /// Embed every text, one vector per input in input order
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Embed a single query string
    fn embed_one(&self, text: &str) -> Vec<f32>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    #[inline]
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        (**self).embed(texts)
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Vec<f32> {
        (**self).embed_one(text)
    }
}

#[inline]
pub fn zero_vector(dimension: usize) -> Vec<f32> {
    vec![0.0; dimension]
}

#[inline]
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}
