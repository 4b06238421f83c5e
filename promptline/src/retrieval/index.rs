use super::Chunk;
use crate::{Error, Result};

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoredChunk {
    /// Position of the chunk in the index.
    pub id: usize,
    pub score: f32,
    pub chunk: Chunk,
}

/// In-memory exact nearest-neighbour index over chunk embeddings. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// # Errors
    ///
    /// Returns [`Error::EmbeddingFailure`] if there is not exactly one vector per chunk
    /// or the vectors disagree on their dimension.
    pub fn new(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::EmbeddingFailure(format!(
                "Got {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        if let Some(first) = vectors.first() {
            if let Some(bad) = vectors.iter().position(|v| v.len() != first.len()) {
                return Err(Error::EmbeddingFailure(format!(
                    "Embedding {bad} has {} dimensions, expected {}",
                    vectors[bad].len(),
                    first.len()
                )));
            }
        }

        Ok(Self { chunks, vectors })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Returns at most `k` chunks ordered by descending cosine similarity.
    /// Equal scores keep index order, so results are stable for a fixed index and query.
    #[must_use]
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, vector)| (id, cosine_similarity(query, vector)))
            .collect::<Vec<_>>();

        scored.sort_by(|(a_id, a), (b_id, b)| {
            b.partial_cmp(a)
                .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
                .then_with(|| a_id.cmp(b_id))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(id, score)| ScoredChunk {
                id,
                score,
                chunk: self.chunks[id].clone(),
            })
            .collect()
    }
}

/// Cosine similarity, `0.0` when either vector has no magnitude or the dimensions differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
