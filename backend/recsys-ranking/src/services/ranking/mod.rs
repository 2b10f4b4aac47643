/// Ranking Module
///
/// Scores assembled feature matrices with the boosted-tree ranker.
///
/// # Architecture
/// - **Schema**: declared feature names, in model order, with importances
/// - **Model**: ONNX inference with tract-onnx, importance-weighted fallback
/// - **Artifact**: capability reporting shared by every served model
pub mod artifact;
pub mod model;
pub mod schema;

pub use artifact::{ModelDescription, ModelKind, ServingModel};
pub use model::RankingModel;
pub use schema::{FeatureSchema, FeatureSpec};

use crate::error::Result;
use crate::models::FeatureMatrix;

/// Maps a feature matrix to one score per row, in row order.
///
/// Implementations are CPU-bound and synchronous; callers run them off the
/// async executor.
#[cfg_attr(test, mockall::automock)]
pub trait Scorer: Send + Sync {
    /// Feature names the scorer expects, in column order.
    fn schema(&self) -> &FeatureSchema;

    fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<f32>>;
}
