use super::FeatureStore;
use crate::config::RedisConfig;
use crate::error::CollaboratorError;
use crate::models::{CandidateId, FeatureRow, FeatureValue};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

/// Feature rows stored as Redis hashes.
///
/// Key format: {article_prefix}:{candidate_id} and {customer_prefix}:{customer_id}
pub struct RedisFeatureStore {
    redis: redis::Client,
    article_prefix: String,
    customer_prefix: String,
}

impl RedisFeatureStore {
    pub fn new(redis: redis::Client, config: &RedisConfig) -> Self {
        Self {
            redis,
            article_prefix: config.article_key_prefix.clone(),
            customer_prefix: config.customer_key_prefix.clone(),
        }
    }

    fn article_key(&self, id: &str) -> String {
        format!("{}:{}", self.article_prefix, id)
    }

    fn customer_key(&self, customer_id: &str) -> String {
        format!("{}:{}", self.customer_prefix, customer_id)
    }
}

fn to_row(hash: HashMap<String, String>) -> FeatureRow {
    hash.into_iter()
        .map(|(field, raw)| {
            let value = FeatureValue::parse(&raw);
            (field, value)
        })
        .collect()
}

#[async_trait]
impl FeatureStore for RedisFeatureStore {
    async fn get_feature_rows(
        &self,
        ids: &[CandidateId],
    ) -> Result<HashMap<CandidateId, FeatureRow>, CollaboratorError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // One round trip: HGETALL per id, pipelined
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.hgetall(self.article_key(id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        if hashes.len() != ids.len() {
            return Err(CollaboratorError::Malformed(format!(
                "pipeline returned {} replies for {} keys",
                hashes.len(),
                ids.len()
            )));
        }

        let rows: HashMap<CandidateId, FeatureRow> = ids
            .iter()
            .zip(hashes)
            .filter(|(_, hash)| !hash.is_empty())
            .map(|(id, hash)| (id.clone(), to_row(hash)))
            .collect();

        debug!(requested = ids.len(), found = rows.len(), "Fetched candidate feature rows");
        Ok(rows)
    }

    async fn get_customer_row(&self, customer_id: &str) -> Result<FeatureRow, CollaboratorError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let hash: HashMap<String, String> = conn.hgetall(self.customer_key(customer_id)).await?;

        Ok(to_row(hash))
    }
}
