//! Neighbor sets for every anchor chunk

use tracing::info;

use crate::similarity::SimilarityIndex;
use crate::{Corpus, Error, NeighborSet, Result};

/// Produces a `NeighborSet` of fixed size `k` for any chunk of a corpus
pub struct NeighborSelector<'a> {
    index: SimilarityIndex<'a>,
    k: usize,
}

impl<'a> NeighborSelector<'a> {
    /// Default neighbor count
    pub const DEFAULT_K: usize = 5;

    /// Fails with `InsufficientData` when the corpus cannot supply `k`
    /// neighbors for every chunk; this is fatal for a synthesis run.
    pub fn new(corpus: &'a Corpus, k: usize) -> Result<Self> {
        let available = corpus.len().saturating_sub(1);
        if corpus.is_empty() || available < k {
            return Err(Error::InsufficientData {
                requested: k,
                available,
            });
        }
        info!(chunks = corpus.len(), k, "neighbor selector ready");
        Ok(Self {
            index: SimilarityIndex::build(corpus),
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn select(&self, chunk_id: &str) -> Result<NeighborSet> {
        Ok(NeighborSet {
            anchor_id: chunk_id.to_string(),
            neighbors: self.index.nearest(chunk_id, self.k)?,
        })
    }

    /// Neighbor sets for every chunk, in corpus order
    pub fn select_all(&self) -> Result<Vec<NeighborSet>> {
        self.index
            .corpus()
            .chunks()
            .iter()
            .map(|chunk| self.select(&chunk.id))
            .collect()
    }
}
