//! Exact cosine-similarity index over chunk embeddings

use std::cmp::Ordering;
use tracing::debug;

use crate::{Corpus, Error, Neighbor, Result};

/// Cosine similarity of two vectors. Zero when either has zero magnitude
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Rank order for neighbors: descending score, then ascending chunk id
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Brute-force k-NN over every chunk of a corpus.
///
/// Deterministic for a fixed embedding set: no approximate search is used.
pub struct SimilarityIndex<'a> {
    corpus: &'a Corpus,
}

impl<'a> SimilarityIndex<'a> {
    pub fn build(corpus: &'a Corpus) -> Self {
        debug!(chunks = corpus.len(), dimension = corpus.dimension(), "built similarity index");
        Self { corpus }
    }

    pub fn corpus(&self) -> &'a Corpus {
        self.corpus
    }

    /// The `k` chunks most similar to `anchor_id`, excluding the anchor.
    ///
    /// Fails with `NotFound` for an unknown anchor and `InsufficientData`
    /// when fewer than `k` other chunks exist.
    pub fn nearest(&self, anchor_id: &str, k: usize) -> Result<Vec<Neighbor>> {
        let anchor = self.corpus.get(anchor_id)?;
        let available = self.corpus.len() - 1;
        if available < k {
            return Err(Error::InsufficientData {
                requested: k,
                available,
            });
        }

        let mut scored: Vec<Neighbor> = self
            .corpus
            .chunks()
            .iter()
            .filter(|chunk| chunk.id != anchor.id)
            .map(|chunk| Neighbor {
                chunk_id: chunk.id.clone(),
                score: cosine_similarity(&anchor.embedding, &chunk.embedding),
            })
            .collect();

        scored.sort_by(neighbor_order);
        scored.truncate(k);
        Ok(scored)
    }
}
