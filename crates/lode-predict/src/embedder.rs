use std::sync::Arc;

use crate::error::PredictError;
use crate::traits::EmbeddingPredictor;

/// Result of embedding a list of texts.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Set when at least one predictor batch failed and zero vectors were
    /// substituted. Callers record this as lowered confidence.
    pub degraded: bool,
}

/// Batching and normalization front for an [`EmbeddingPredictor`].
///
/// The pipeline must keep moving even when the predictor is down, so this
/// never returns an error: a failed batch yields zero vectors for its
/// slots and flips the `degraded` flag.
pub struct Embedder {
    predictor: Arc<dyn EmbeddingPredictor>,
    batch_size: usize,
}

impl Embedder {
    pub fn new(predictor: Arc<dyn EmbeddingPredictor>, batch_size: usize) -> Self {
        Self {
            predictor,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.predictor.dimension()
    }

    /// Embed `texts` in batches of at most the configured size.
    pub fn embed(&self, texts: &[String], normalize: bool) -> EmbeddingBatch {
        let dim = self.predictor.dimension();
        let mut vectors = Vec::with_capacity(texts.len());
        let mut degraded = false;

        for batch in texts.chunks(self.batch_size) {
            match self.embed_one_batch(batch, dim) {
                Ok(mut vs) => {
                    if normalize {
                        for v in &mut vs {
                            l2_normalize(v);
                        }
                    }
                    vectors.extend(vs);
                }
                Err(e) => {
                    tracing::warn!(
                        batch_len = batch.len(),
                        error = %e,
                        "embedding batch failed, substituting zero vectors"
                    );
                    degraded = true;
                    vectors.extend(batch.iter().map(|_| vec![0.0f32; dim]));
                }
            }
        }

        EmbeddingBatch { vectors, degraded }
    }

    /// Convenience for the query path: embed a single text, normalized.
    /// Returns `None` when the predictor failed (the zero vector is useless
    /// as a query).
    pub fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        let batch = self.embed(std::slice::from_ref(&text.to_string()), true);
        if batch.degraded {
            return None;
        }
        batch.vectors.into_iter().next()
    }

    fn embed_one_batch(&self, batch: &[String], dim: usize) -> Result<Vec<Vec<f32>>, PredictError> {
        let vs = self.predictor.embed(batch)?;
        if vs.len() != batch.len() {
            return Err(PredictError::Malformed {
                reason: format!("expected {} vectors, got {}", batch.len(), vs.len()),
            });
        }
        if let Some(bad) = vs.iter().find(|v| v.len() != dim) {
            return Err(PredictError::Malformed {
                reason: format!("expected dimension {dim}, got {}", bad.len()),
            });
        }
        Ok(vs)
    }
}

/// Scale a vector to unit L2 norm. Zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
