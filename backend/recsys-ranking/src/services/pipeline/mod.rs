/// Ranking Pipeline
///
/// Drives one request through retrieval, history filtering, feature
/// assembly, scoring and truncation. All downgrade-vs-fail decisions for
/// collaborator errors are made here.
mod stage;

pub use stage::{Stage, StageTrace};

use crate::context::RequestContext;
use crate::error::{RankingError, Result};
use crate::models::{CandidateId, FeatureMatrix, RankingRequest, RankingResponse, ScoredCandidate};
use crate::services::features::{FeatureAssembler, MonthEncoding};
use crate::services::history::HistoryFilter;
use crate::services::ranking::Scorer;
use crate::services::recall::CandidateRetriever;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Number of ranked candidates returned per request.
pub const TOP_K_RESPONSE: usize = 10;

enum Preprocessed {
    /// Nothing left to rank; respond with an empty ranking.
    Empty,
    Ready {
        candidates: Vec<CandidateId>,
        matrix: FeatureMatrix,
    },
}

pub struct RankingOrchestrator {
    retriever: CandidateRetriever,
    history: HistoryFilter,
    assembler: FeatureAssembler,
    scorer: Arc<dyn Scorer>,
}

impl RankingOrchestrator {
    pub fn new(
        retriever: CandidateRetriever,
        history: HistoryFilter,
        assembler: FeatureAssembler,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            retriever,
            history,
            assembler,
            scorer,
        }
    }

    pub fn retriever(&self) -> &CandidateRetriever {
        &self.retriever
    }

    pub async fn rank(
        &self,
        ctx: &RequestContext,
        request: &RankingRequest,
    ) -> Result<RankingResponse> {
        let mut trace = StageTrace::new(ctx);

        let (candidates, matrix) = match self.preprocess(ctx, request, &mut trace).await {
            Ok(Preprocessed::Ready { candidates, matrix }) => (candidates, matrix),
            Ok(Preprocessed::Empty) => {
                trace.enter(Stage::Ranked);
                trace.enter(Stage::Responded);
                info!(
                    correlation_id = ctx.correlation_id(),
                    elapsed_ms = ctx.elapsed_ms(),
                    "No candidates to rank"
                );
                return Ok(RankingResponse::default());
            }
            Err(e) => return Err(trace.fail(e)),
        };

        trace.enter(Stage::Scoring);
        let scores = match self.score(matrix).await {
            Ok(scores) => scores,
            Err(e) => return Err(trace.fail(e)),
        };

        trace.enter(Stage::Ranked);
        let scored = candidates.len();
        let ranking = match postprocess(candidates, scores) {
            Ok(ranking) => ranking,
            Err(e) => return Err(trace.fail(e)),
        };

        info!(
            correlation_id = ctx.correlation_id(),
            scored,
            returned = ranking.len(),
            top_score = ranking.first().map(|r| r.score),
            bottom_score = ranking.last().map(|r| r.score),
            elapsed_ms = ctx.elapsed_ms(),
            "Ranking completed"
        );
        trace.enter(Stage::Responded);

        Ok(RankingResponse { ranking })
    }

    async fn preprocess(
        &self,
        ctx: &RequestContext,
        request: &RankingRequest,
        trace: &mut StageTrace<'_>,
    ) -> Result<Preprocessed> {
        trace.enter(Stage::Retrieving);

        // Independent lookups; both must finish before filtering
        let (retrieved, consumed) = tokio::join!(
            self.retriever
                .retrieve(&request.query_embedding, self.retriever.k()),
            self.history.already_consumed(&request.customer_id),
        );

        let retrieved = match retrieved {
            Ok(ids) => ids,
            Err(e @ RankingError::Retrieval(_)) => {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    error = %e,
                    "Candidate retrieval failed, continuing with no candidates"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if retrieved.is_empty() {
            return Ok(Preprocessed::Empty);
        }

        trace.enter(Stage::Filtering);
        let consumed = match consumed {
            Ok(consumed) => consumed,
            Err(e) => {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    error = %e,
                    "Purchase history unavailable, treating as no known history"
                );
                HashSet::new()
            }
        };

        let retrieved_count = retrieved.len();
        let candidates = HistoryFilter::remove_consumed(retrieved, &consumed);
        info!(
            correlation_id = ctx.correlation_id(),
            retrieved = retrieved_count,
            remaining = candidates.len(),
            "Candidates filtered against purchase history"
        );
        if candidates.is_empty() {
            return Ok(Preprocessed::Empty);
        }

        trace.enter(Stage::Assembling);
        let month = MonthEncoding {
            sin: request.month_sin,
            cos: request.month_cos,
        };
        let matrix = self
            .assembler
            .assemble(
                ctx,
                &candidates,
                &request.customer_id,
                month,
                self.scorer.schema(),
            )
            .await?;

        if matrix.row_count() != candidates.len() {
            return Err(RankingError::FeatureSchema(format!(
                "assembled {} rows for {} candidates",
                matrix.row_count(),
                candidates.len()
            )));
        }

        Ok(Preprocessed::Ready { candidates, matrix })
    }

    /// Scoring is CPU-bound and runs on the blocking pool.
    async fn score(&self, matrix: FeatureMatrix) -> Result<Vec<f32>> {
        let scorer = Arc::clone(&self.scorer);
        let rows = matrix.row_count();

        let scores = tokio::task::spawn_blocking(move || scorer.score(&matrix))
            .await
            .map_err(|e| RankingError::Scoring(format!("scoring task failed: {}", e)))??;

        if scores.len() != rows {
            return Err(RankingError::Scoring(format!(
                "scorer returned {} scores for {} rows",
                scores.len(),
                rows
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(RankingError::Scoring(
                "scorer returned non-finite scores".to_string(),
            ));
        }

        Ok(scores)
    }
}

/// Pair scores with ids positionally, sort best first (stable, so equal
/// scores keep candidate order) and keep the top `TOP_K_RESPONSE`.
pub fn postprocess(candidates: Vec<CandidateId>, scores: Vec<f32>) -> Result<Vec<ScoredCandidate>> {
    if candidates.len() != scores.len() {
        return Err(RankingError::Scoring(format!(
            "{} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut ranking: Vec<ScoredCandidate> = scores
        .into_iter()
        .zip(candidates)
        .map(|(score, candidate_id)| ScoredCandidate {
            score,
            candidate_id,
        })
        .collect();

    ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranking.truncate(TOP_K_RESPONSE);

    Ok(ranking)
}
