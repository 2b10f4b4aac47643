mod embedding_index;

pub use embedding_index::{EmbeddingIndex, IndexEntry};

use super::bounded;
use crate::error::{CollaboratorError, RankingError, Result};
use crate::models::CandidateId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Nearest-neighbour lookup over precomputed candidate embeddings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateIndex: Send + Sync {
    /// Candidate ids ordered by similarity to `query`, best first, at most `k`.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<CandidateId>, CollaboratorError>;

    /// Embedding width, when the index knows it.
    fn dimension(&self) -> Option<usize>;

    fn candidate_count(&self) -> usize;
}

/// Recall layer: distance-ranked candidate lookup for one query embedding.
pub struct CandidateRetriever {
    index: Arc<dyn CandidateIndex>,
    k: usize,
    timeout: Duration,
}

impl CandidateRetriever {
    pub fn new(index: Arc<dyn CandidateIndex>, k: usize, timeout: Duration) -> Self {
        Self { index, k, timeout }
    }

    /// Configured retrieval cap.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    pub fn candidate_count(&self) -> usize {
        self.index.candidate_count()
    }

    /// Fails with `RankingError::Retrieval` when the index is unreachable,
    /// empty or slow; whether that is fatal is decided by the caller.
    pub async fn retrieve(&self, query_embedding: &[f32], k: usize) -> Result<Vec<CandidateId>> {
        let mut candidates = bounded(
            self.timeout,
            self.index.similarity_search(query_embedding, k),
        )
        .await
        .map_err(|e| RankingError::Retrieval(e.to_string()))?;

        candidates.truncate(k);
        debug!(retrieved = candidates.len(), k, "Candidate retrieval completed");

        Ok(candidates)
    }
}
