use sha2::{Digest, Sha256};

use crate::error::PredictError;
use crate::traits::EmbeddingPredictor;

/// Deterministic local embedding: hashed bag-of-words.
///
/// Each lowercased token is hashed into a bucket with a sign bit, so texts
/// sharing vocabulary land near each other under cosine similarity while
/// disjoint texts score ~0. No model download, no network, fully
/// reproducible — the embedding used by tests, benchmarks, and offline
/// operation.
pub struct HashEmbedding {
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn accumulate(&self, text: &str, out: &mut [f32]) {
        for token in tokenize(text) {
            let (bucket, sign) = self.slot(&token);
            out[bucket] += sign;
        }
    }

    fn slot(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let raw = u64::from_le_bytes(digest[0..8].try_into().unwrap_or_default());
        let bucket = (raw % self.dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

/// Lowercased alphanumeric runs; CJK characters are individual tokens.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if ch.is_ascii() {
                current.push(ch.to_ascii_lowercase());
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

impl EmbeddingPredictor for HashEmbedding {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PredictError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; self.dim];
                self.accumulate(t, &mut v);
                v
            })
            .collect())
    }
}
