#![allow(dead_code)]

use async_trait::async_trait;
use recsys_ranking::error::{CollaboratorError, Result as RankingResult};
use recsys_ranking::models::{CandidateId, FeatureMatrix, FeatureRow, FeatureValue};
use recsys_ranking::services::features::FeatureStore;
use recsys_ranking::services::history::PurchaseHistory;
use recsys_ranking::services::ranking::{FeatureSchema, FeatureSpec, RankingModel, Scorer};
use recsys_ranking::services::recall::CandidateIndex;
use recsys_ranking::services::{
    CandidateRetriever, FeatureAssembler, HistoryFilter, RankingOrchestrator, ServingModel,
};
use recsys_ranking::AppState;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSION: usize = 3;

/// Every collaborator call made while serving, for call-count assertions.
#[derive(Default)]
pub struct CallLog {
    pub index: AtomicUsize,
    pub history: AtomicUsize,
    pub feature_rows: AtomicUsize,
    pub customer_rows: AtomicUsize,
    pub requested_ids: Mutex<Vec<Vec<CandidateId>>>,
    pub scored_columns: Mutex<Vec<Vec<String>>>,
}

impl CallLog {
    pub fn total(&self) -> usize {
        self.index.load(Ordering::SeqCst)
            + self.history.load(Ordering::SeqCst)
            + self.feature_rows.load(Ordering::SeqCst)
            + self.customer_rows.load(Ordering::SeqCst)
    }
}

pub struct FakeIndex {
    pub results: Vec<CandidateId>,
    pub fail: bool,
    pub calls: Arc<CallLog>,
}

#[async_trait]
impl CandidateIndex for FakeIndex {
    async fn similarity_search(
        &self,
        _query: &[f32],
        k: usize,
    ) -> Result<Vec<CandidateId>, CollaboratorError> {
        self.calls.index.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CollaboratorError::Unavailable("index offline".into()));
        }
        Ok(self.results.iter().take(k).cloned().collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIMENSION)
    }

    fn candidate_count(&self) -> usize {
        self.results.len()
    }
}

pub struct FakeHistory {
    pub consumed: HashSet<CandidateId>,
    pub calls: Arc<CallLog>,
}

#[async_trait]
impl PurchaseHistory for FakeHistory {
    async fn already_consumed(
        &self,
        _customer_id: &str,
    ) -> Result<HashSet<CandidateId>, CollaboratorError> {
        self.calls.history.fetch_add(1, Ordering::SeqCst);
        Ok(self.consumed.clone())
    }
}

pub struct FakeStore {
    pub rows: HashMap<CandidateId, FeatureRow>,
    pub customer: FeatureRow,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: Arc<CallLog>,
}

#[async_trait]
impl FeatureStore for FakeStore {
    async fn get_feature_rows(
        &self,
        ids: &[CandidateId],
    ) -> Result<HashMap<CandidateId, FeatureRow>, CollaboratorError> {
        self.calls.feature_rows.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.calls.requested_ids.lock() {
            requested.push(ids.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CollaboratorError::Unavailable("feature store offline".into()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    async fn get_customer_row(&self, _customer_id: &str) -> Result<FeatureRow, CollaboratorError> {
        self.calls.customer_rows.fetch_add(1, Ordering::SeqCst);
        Ok(self.customer.clone())
    }
}

/// Weighted model that records the columns of every matrix it scores.
pub struct RecordingScorer {
    pub inner: RankingModel,
    pub calls: Arc<CallLog>,
}

impl Scorer for RecordingScorer {
    fn schema(&self) -> &FeatureSchema {
        self.inner.schema()
    }

    fn score(&self, matrix: &FeatureMatrix) -> RankingResult<Vec<f32>> {
        if let Ok(mut columns) = self.calls.scored_columns.lock() {
            columns.push(matrix.columns().to_vec());
        }
        self.inner.score(matrix)
    }
}

pub fn ids(values: &[&str]) -> Vec<CandidateId> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn row(fields: &[(&str, FeatureValue)]) -> FeatureRow {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn schema(features: &[(&str, f32)]) -> FeatureSchema {
    FeatureSchema::new(
        features
            .iter()
            .map(|(name, importance)| FeatureSpec {
                name: name.to_string(),
                importance: *importance,
            })
            .collect(),
    )
    .unwrap()
}

/// Describes the collaborator state one test runs against.
pub struct Fixture {
    pub retrieved: Vec<CandidateId>,
    pub consumed: Vec<CandidateId>,
    pub rows: Vec<(CandidateId, FeatureRow)>,
    pub customer: FeatureRow,
    pub schema: FeatureSchema,
    pub index_fails: bool,
    pub store_fails: bool,
    pub store_delay: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            retrieved: Vec::new(),
            consumed: Vec::new(),
            rows: Vec::new(),
            customer: FeatureRow::new(),
            schema: schema(&[("signal", 1.0)]),
            index_fails: false,
            store_fails: false,
            store_delay: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl Fixture {
    pub fn build(self) -> (AppState, Arc<CallLog>) {
        let calls = Arc::new(CallLog::default());
        let budget = Duration::from_secs(1);

        let index = FakeIndex {
            results: self.retrieved,
            fail: self.index_fails,
            calls: calls.clone(),
        };
        let history = FakeHistory {
            consumed: self.consumed.into_iter().collect(),
            calls: calls.clone(),
        };
        let store = FakeStore {
            rows: self.rows.into_iter().collect(),
            customer: self.customer,
            fail: self.store_fails,
            delay: self.store_delay,
            calls: calls.clone(),
        };
        let model = RankingModel::weighted(self.schema).with_identity("ranker", "test");
        let description_model: Arc<dyn ServingModel> =
            Arc::new(RankingModel::weighted(model.schema().clone()).with_identity("ranker", "test"));
        let scorer = RecordingScorer {
            inner: model,
            calls: calls.clone(),
        };

        let orchestrator = RankingOrchestrator::new(
            CandidateRetriever::new(Arc::new(index), 100, budget),
            HistoryFilter::new(Arc::new(history), budget),
            FeatureAssembler::new(
                Arc::new(store),
                vec![(
                    "colour_group_name_right".to_string(),
                    "colour_group_name".to_string(),
                )],
                budget,
            ),
            Arc::new(scorer),
        );

        let state = AppState {
            service_name: "recsys-ranking-test".to_string(),
            orchestrator: Arc::new(orchestrator),
            models: vec![description_model],
            request_timeout: self.request_timeout,
        };

        (state, calls)
    }
}
