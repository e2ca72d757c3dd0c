//! Replaceable nearest-neighbour index.
//!
//! The answer pipeline only needs "give me the k closest vectors"; the
//! [`VectorIndex`] trait keeps that seam narrow so an ANN backend can
//! replace the brute-force [`FlatIndex`] without touching callers.

use crate::embedding::cosine_similarity;

/// A read-only nearest-neighbour index over fixed vectors.
///
/// Positions refer to insertion order.
pub trait VectorIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` `(position, score)` pairs by descending similarity.
    /// Equal scores keep insertion order; NaN scores are never returned.
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Brute-force cosine index.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .filter(|(_, score)| !score.is_nan())
            .collect();
        // `sort_by` is stable, so ties keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}
