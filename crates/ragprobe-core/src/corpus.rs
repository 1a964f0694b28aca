//! The chunk collection of one knowledge base

use std::collections::HashMap;

use crate::{Chunk, Error, Result};

/// Chunks of a single knowledge base, addressable by id.
///
/// All embeddings share one dimension and ids are unique.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
    dimension: usize,
}

impl Corpus {
    /// Build a corpus, rejecting duplicate ids and mixed embedding dimensions
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        let mut positions = HashMap::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != dimension {
                return Err(Error::InvalidInput(format!(
                    "chunk '{}' has embedding dimension {} (expected {})",
                    chunk.id,
                    chunk.embedding.len(),
                    dimension
                )));
            }
            if positions.insert(chunk.id.clone(), i).is_some() {
                return Err(Error::InvalidInput(format!("duplicate chunk id '{}'", chunk.id)));
            }
        }

        Ok(Self {
            chunks,
            positions,
            dimension,
        })
    }

    pub fn get(&self, id: &str) -> Result<&Chunk> {
        self.positions
            .get(id)
            .map(|&i| &self.chunks[i])
            .ok_or_else(|| Error::NotFound(format!("chunk '{}'", id)))
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Texts of the given chunks, in the given order
    pub fn texts(&self, ids: &[String]) -> Result<Vec<String>> {
        ids.iter().map(|id| self.get(id).map(|c| c.text.clone())).collect()
    }
}
