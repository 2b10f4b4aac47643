/// Model Capability Interface
///
/// Every artifact loaded at startup reports what it is and what it expects as
/// input. Two kinds are served: the candidate side of the two-tower embedding
/// model (backing retrieval) and the boosted-tree ranker.
use super::schema::FeatureSpec;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    EmbeddingTower,
    TreeEnsemble,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub name: String,
    pub version: String,
    pub kind: ModelKind,
    pub backend: &'static str,
    pub input_dimension: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
}

pub trait ServingModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn describe(&self) -> ModelDescription;
}
