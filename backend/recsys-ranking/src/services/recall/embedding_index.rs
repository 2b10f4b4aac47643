use super::CandidateIndex;
use crate::error::CollaboratorError;
use crate::models::CandidateId;
use crate::services::ranking::{ModelDescription, ModelKind, ServingModel};
use async_trait::async_trait;
use ndarray::{Array2, ArrayView1, Axis};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One line of the exported candidate-tower embeddings.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub candidate_id: CandidateId,
    pub embedding: Vec<f32>,
}

/// In-process cosine-similarity index over candidate-tower embeddings.
///
/// Rows are L2-normalized at load time, so a search is one matrix-vector
/// product. Read-only after construction. The product and sort run on the
/// blocking pool, so retrieval timeouts still fire on a large index.
pub struct EmbeddingIndex {
    ids: Arc<[CandidateId]>,
    vectors: Arc<Array2<f32>>,
}

impl EmbeddingIndex {
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self, CollaboratorError> {
        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(entries.len());
        let mut flat = Vec::with_capacity(entries.len() * dimension);

        for entry in entries {
            if entry.embedding.is_empty() || entry.embedding.len() != dimension {
                return Err(CollaboratorError::Malformed(format!(
                    "candidate '{}' has dimension {}, expected {}",
                    entry.candidate_id,
                    entry.embedding.len(),
                    dimension
                )));
            }
            if entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(CollaboratorError::Malformed(format!(
                    "candidate '{}' has non-finite embedding values",
                    entry.candidate_id
                )));
            }

            let norm = entry.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
            let scale = if norm > 0.0 { 1.0 / norm } else { 0.0 };
            flat.extend(entry.embedding.iter().map(|v| v * scale));
            ids.push(entry.candidate_id);
        }

        let vectors = Array2::from_shape_vec((ids.len(), dimension), flat)
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;

        Ok(Self {
            ids: ids.into(),
            vectors: Arc::new(vectors),
        })
    }

    /// Load a JSON-lines export; blank lines are skipped.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CollaboratorError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;

        let entries = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<IndexEntry>(line).map_err(|e| {
                    CollaboratorError::Malformed(format!("{}:{}: {}", path.display(), n + 1, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let index = Self::from_entries(entries)?;
        info!(
            path = %path.display(),
            candidates = index.len(),
            dimension = index.vectors.ncols(),
            "Loaded candidate embedding index"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

}

/// Cosine similarity of every row against `query`, in index order.
fn similarities(vectors: &Array2<f32>, query: &[f32]) -> Vec<f32> {
    let query = ArrayView1::from(query);
    let norm = query.dot(&query).sqrt();
    if norm == 0.0 {
        return vec![0.0; vectors.nrows()];
    }
    vectors.dot(&query).iter().map(|s| s / norm).collect()
}

fn top_k(ids: &[CandidateId], vectors: &Array2<f32>, query: &[f32], k: usize) -> Vec<CandidateId> {
    let scores = similarities(vectors, query);
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable: equal scores keep index order.
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    order.into_iter().take(k).map(|i| ids[i].clone()).collect()
}

#[async_trait]
impl CandidateIndex for EmbeddingIndex {
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<CandidateId>, CollaboratorError> {
        if self.is_empty() {
            return Err(CollaboratorError::EmptyIndex);
        }
        if query.len() != self.vectors.len_of(Axis(1)) {
            return Err(CollaboratorError::Malformed(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.vectors.ncols()
            )));
        }

        let ids = Arc::clone(&self.ids);
        let vectors = Arc::clone(&self.vectors);
        let query = query.to_vec();

        tokio::task::spawn_blocking(move || top_k(&ids, &vectors, &query, k))
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("similarity search failed: {}", e)))
    }

    fn dimension(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.vectors.ncols())
    }

    fn candidate_count(&self) -> usize {
        self.len()
    }
}

impl ServingModel for EmbeddingIndex {
    fn kind(&self) -> ModelKind {
        ModelKind::EmbeddingTower
    }

    fn describe(&self) -> ModelDescription {
        ModelDescription {
            name: "candidate_tower".to_string(),
            version: "default".to_string(),
            kind: self.kind(),
            backend: "in_memory",
            input_dimension: self.vectors.ncols(),
            features: Vec::new(),
            item_count: Some(self.len()),
        }
    }
}
