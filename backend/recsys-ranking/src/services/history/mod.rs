/// Purchase history lookup and the already-consumed filter.
use super::bounded;
use crate::config::RedisConfig;
use crate::error::{CollaboratorError, RankingError, Result};
use crate::models::CandidateId;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseHistory: Send + Sync {
    /// Ids the customer already bought. No history is an empty set.
    async fn already_consumed(
        &self,
        customer_id: &str,
    ) -> std::result::Result<HashSet<CandidateId>, CollaboratorError>;
}

/// Purchases kept as a Redis set per customer.
/// Key format: {customer_prefix}:{customer_id}:{suffix}
pub struct RedisPurchaseHistory {
    redis: redis::Client,
    customer_prefix: String,
    suffix: String,
}

impl RedisPurchaseHistory {
    pub fn new(redis: redis::Client, config: &RedisConfig) -> Self {
        Self {
            redis,
            customer_prefix: config.customer_key_prefix.clone(),
            suffix: config.purchases_key_suffix.clone(),
        }
    }

    fn key(&self, customer_id: &str) -> String {
        format!("{}:{}:{}", self.customer_prefix, customer_id, self.suffix)
    }
}

#[async_trait]
impl PurchaseHistory for RedisPurchaseHistory {
    async fn already_consumed(
        &self,
        customer_id: &str,
    ) -> std::result::Result<HashSet<CandidateId>, CollaboratorError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // SMEMBERS on a missing key is an empty set
        let purchased: HashSet<CandidateId> = conn.smembers(self.key(customer_id)).await?;

        Ok(purchased)
    }
}

/// Removes already-consumed candidates from a retrieval result.
pub struct HistoryFilter {
    history: Arc<dyn PurchaseHistory>,
    timeout: Duration,
}

impl HistoryFilter {
    pub fn new(history: Arc<dyn PurchaseHistory>, timeout: Duration) -> Self {
        Self { history, timeout }
    }

    pub async fn already_consumed(&self, customer_id: &str) -> Result<HashSet<CandidateId>> {
        let consumed = bounded(self.timeout, self.history.already_consumed(customer_id))
            .await
            .map_err(|e| RankingError::collaborator("purchase history", e))?;

        debug!(consumed = consumed.len(), "Purchase history loaded");
        Ok(consumed)
    }

    /// Membership test per id, in retrieval order. Never re-sorts and never
    /// deduplicates what remains.
    pub fn remove_consumed(
        candidates: Vec<CandidateId>,
        consumed: &HashSet<CandidateId>,
    ) -> Vec<CandidateId> {
        if consumed.is_empty() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|id| !consumed.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn ids(values: &[&str]) -> Vec<CandidateId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_remove_consumed_keeps_order() {
        let consumed: HashSet<CandidateId> = ids(&["b"]).into_iter().collect();

        let remaining = HistoryFilter::remove_consumed(ids(&["a", "b", "c"]), &consumed);

        assert_eq!(remaining, ids(&["a", "c"]));
    }

    #[test]
    fn test_remove_consumed_does_not_deduplicate() {
        let consumed: HashSet<CandidateId> = ids(&["x"]).into_iter().collect();

        let remaining = HistoryFilter::remove_consumed(ids(&["c", "a", "c", "x"]), &consumed);

        assert_eq!(remaining, ids(&["c", "a", "c"]));
    }

    #[test]
    fn test_everything_consumed() {
        let consumed: HashSet<CandidateId> = ids(&["a", "b"]).into_iter().collect();

        assert!(HistoryFilter::remove_consumed(ids(&["a", "b"]), &consumed).is_empty());
    }

    #[tokio::test]
    async fn test_failure_maps_to_collaborator_unavailable() {
        let mut history = MockPurchaseHistory::new();
        history
            .expect_already_consumed()
            .with(eq("c1"))
            .times(1)
            .returning(|_| Err(CollaboratorError::Unavailable("connection refused".into())));

        let filter = HistoryFilter::new(Arc::new(history), Duration::from_secs(1));
        let result = filter.already_consumed("c1").await;

        assert!(matches!(
            result,
            Err(RankingError::CollaboratorUnavailable {
                collaborator: "purchase history",
                ..
            })
        ));
    }

    #[test]
    fn test_key_format() {
        let config = crate::config::Config::from_vars(Vec::new()).unwrap();
        let history = RedisPurchaseHistory::new(
            redis::Client::open(config.redis.url.as_str()).unwrap(),
            &config.redis,
        );

        assert_eq!(history.key("c1"), "customer:c1:purchases");
    }
}
