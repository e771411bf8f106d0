//! Deterministic embedders for exercising retrieval without a provider

use super::{Embedder, zero_vector};

pub const TEST_DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase token hashes to one axis
pub struct HashEmbedder;

fn token_slot(token: &str) -> usize {
    let hash = token.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3)
    });
    (hash % TEST_DIMENSION as u64) as usize
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = zero_vector(TEST_DIMENSION);
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            v[token_slot(&token.to_lowercase())] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

/// Provider that is down for every request
pub struct ZeroEmbedder;

impl Embedder for ZeroEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|_| zero_vector(TEST_DIMENSION)).collect()
    }

    fn embed_one(&self, _text: &str) -> Vec<f32> {
        zero_vector(TEST_DIMENSION)
    }
}
