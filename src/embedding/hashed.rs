//! Deterministic feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets with a ±1 sign, and the vector is L2-normalised. Texts that
//! share rare tokens (identifiers, codes, names) land close together, which
//! is enough for offline use and for tests. It has no notion of synonyms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;

pub(super) const DEFAULT_DIMS: usize = 384;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vec {
                *x /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let e = HashEmbedder::new(128);
        let a = e.embed_text("The quick brown fox");
        let b = e.embed_text("the QUICK brown fox!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_tokens_score_higher() {
        let e = HashEmbedder::new(384);
        let query = e.embed_text("what is ZEBRA123");
        let hit = e.embed_text("ZEBRA123 is the access code; ZEBRA123 opens the vault.");
        let miss = e.embed_text("Kubernetes schedules pods onto nodes.");
        assert!(cosine_similarity(&query, &hit) > cosine_similarity(&query, &miss));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_text("  ").iter().all(|x| *x == 0.0));
    }
}
