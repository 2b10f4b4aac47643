pub mod features;
pub mod history;
pub mod pipeline;
pub mod ranking;
pub mod recall;

pub use features::{FeatureAssembler, FeatureStore, RedisFeatureStore};
pub use history::{HistoryFilter, PurchaseHistory, RedisPurchaseHistory};
pub use pipeline::{RankingOrchestrator, Stage, TOP_K_RESPONSE};
pub use ranking::{FeatureSchema, ModelKind, RankingModel, Scorer, ServingModel};
pub use recall::{CandidateIndex, CandidateRetriever, EmbeddingIndex};

use crate::error::CollaboratorError;
use std::future::Future;
use std::time::Duration;

/// Run one collaborator call under its time budget. Single attempt.
pub(crate) async fn bounded<F, T>(budget: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(budget)),
    }
}
