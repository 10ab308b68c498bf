use crate::models::{DocumentChunk, ScoredChunk};
use crate::QaError;

#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub vector: Vec<f32>,
    pub chunk: DocumentChunk,
}

/// Append-only list of embedded chunks searched linearly.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: Vec<VectorEntry>,
    dimensions: usize,
}

impl MemoryVectorStore {
    pub fn from_embeddings(
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, QaError> {
        if chunks.len() != embeddings.len() {
            return Err(QaError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(embeddings) {
            if vector.len() != dimensions {
                return Err(QaError::Embedding(format!(
                    "embedding dimension {} != {}",
                    vector.len(),
                    dimensions
                )));
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(QaError::Embedding(format!(
                    "embedding for chunk {} contains non-finite values",
                    chunk.chunk_index
                )));
            }
            entries.push(VectorEntry { vector, chunk });
        }

        Ok(Self {
            entries,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top `k` entries by cosine similarity, best first. Ties keep insertion order.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, QaError> {
        let ranked = self.ranked(query)?;
        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(index, score)| ScoredChunk {
                chunk: self.entries[index].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Picks `k` of the `fetch_k` most similar entries, trading query relevance
    /// (`lambda = 1.0`) against diversity from already picked entries (`lambda = 0.0`).
    pub fn max_marginal_relevance_search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<ScoredChunk>, QaError> {
        let candidates: Vec<(usize, f32)> = self
            .ranked(query)?
            .into_iter()
            .take(fetch_k.max(k))
            .collect();

        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);
        let mut remaining = candidates;

        while selected.len() < k && !remaining.is_empty() {
            let mut best_position = 0;
            let mut best_score = f32::NEG_INFINITY;

            for (position, (index, relevance)) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|(picked, _)| {
                        cosine_similarity(&self.entries[*index].vector, &self.entries[*picked].vector)
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let score = lambda * relevance - (1.0 - lambda) * redundancy;

                if score > best_score {
                    best_score = score;
                    best_position = position;
                }
            }

            selected.push(remaining.remove(best_position));
        }

        Ok(selected
            .into_iter()
            .map(|(index, score)| ScoredChunk {
                chunk: self.entries[index].chunk.clone(),
                score,
            })
            .collect())
    }

    fn ranked(&self, query: &[f32]) -> Result<Vec<(usize, f32)>, QaError> {
        if !self.entries.is_empty() && query.len() != self.dimensions {
            return Err(QaError::Embedding(format!(
                "query vector dim {} is not {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index, cosine_similarity(query, &entry.vector)))
            .collect();

        // stable sort keeps insertion order on ties
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        Ok(scored)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
