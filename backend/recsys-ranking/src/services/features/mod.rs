// ============================================
// Feature Module
// ============================================
// Keyed feature rows for candidates and customers, and the assembler that
// turns them into the ranker's input matrix

mod assembler;
mod redis_store;

pub use assembler::{FeatureAssembler, MonthEncoding};
pub use redis_store::RedisFeatureStore;

use crate::error::CollaboratorError;
use crate::models::{CandidateId, FeatureRow};
use async_trait::async_trait;
use std::collections::HashMap;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Rows keyed by candidate id. Ids with no stored row are absent from
    /// the map; callers must look rows up by key, never by position.
    async fn get_feature_rows(
        &self,
        ids: &[CandidateId],
    ) -> Result<HashMap<CandidateId, FeatureRow>, CollaboratorError>;

    /// Static profile fields for one customer. Unknown customers yield an
    /// empty row.
    async fn get_customer_row(&self, customer_id: &str) -> Result<FeatureRow, CollaboratorError>;
}
