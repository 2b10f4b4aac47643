use crate::context::RequestContext;
use crate::error::RankingError;
use std::fmt;
use tracing::{debug, error, warn};

/// Lifecycle of one ranking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Retrieving,
    Filtering,
    Assembling,
    Scoring,
    Ranked,
    Responded,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Retrieving => "retrieving",
            Stage::Filtering => "filtering",
            Stage::Assembling => "assembling",
            Stage::Scoring => "scoring",
            Stage::Ranked => "ranked",
            Stage::Responded => "responded",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Responded | Stage::Failed)
    }

    /// Allowed forward moves. Empty retrieval or filtering jumps to `Ranked`;
    /// any non-terminal stage may fail.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;
        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Received, Retrieving)
            | (Retrieving, Filtering)
            | (Retrieving, Ranked)
            | (Filtering, Assembling)
            | (Filtering, Ranked)
            | (Assembling, Scoring)
            | (Scoring, Ranked)
            | (Ranked, Responded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped record of stage transitions and when they happened.
pub struct StageTrace<'a> {
    ctx: &'a RequestContext,
    current: Stage,
    transitions: Vec<(Stage, u64)>,
}

impl<'a> StageTrace<'a> {
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self {
            ctx,
            current: Stage::Received,
            transitions: vec![(Stage::Received, ctx.elapsed_ms())],
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn enter(&mut self, next: Stage) {
        if !self.current.can_advance_to(next) {
            warn!(
                correlation_id = self.ctx.correlation_id(),
                from = %self.current,
                to = %next,
                "Unexpected stage transition"
            );
        }
        let elapsed_ms = self.ctx.elapsed_ms();
        debug!(
            correlation_id = self.ctx.correlation_id(),
            from = %self.current,
            to = %next,
            elapsed_ms,
            "Stage transition"
        );
        self.current = next;
        self.transitions.push((next, elapsed_ms));
    }

    /// Move to `Failed` and hand the error back for propagation.
    pub fn fail(&mut self, err: RankingError) -> RankingError {
        error!(
            correlation_id = self.ctx.correlation_id(),
            stage = %self.current,
            kind = err.kind(),
            error = %err,
            elapsed_ms = self.ctx.elapsed_ms(),
            "Ranking failed"
        );
        self.enter(Stage::Failed);
        err
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.transitions.iter().map(|(stage, _)| *stage).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_middleware::CorrelationId;

    #[test]
    fn test_transitions() {
        assert!(Stage::Received.can_advance_to(Stage::Retrieving));
        assert!(Stage::Retrieving.can_advance_to(Stage::Ranked));
        assert!(Stage::Filtering.can_advance_to(Stage::Ranked));
        assert!(Stage::Assembling.can_advance_to(Stage::Failed));
        assert!(!Stage::Received.can_advance_to(Stage::Scoring));
        assert!(!Stage::Responded.can_advance_to(Stage::Failed));
    }

    #[test]
    fn test_trace_records_path() {
        let ctx = RequestContext::new(CorrelationId::generate());
        let mut trace = StageTrace::new(&ctx);

        trace.enter(Stage::Retrieving);
        trace.enter(Stage::Ranked);
        trace.enter(Stage::Responded);

        assert_eq!(
            trace.stages(),
            vec![
                Stage::Received,
                Stage::Retrieving,
                Stage::Ranked,
                Stage::Responded
            ]
        );
        assert!(trace.current().is_terminal());
    }

    #[test]
    fn test_fail_returns_error() {
        let ctx = RequestContext::new(CorrelationId::generate());
        let mut trace = StageTrace::new(&ctx);
        trace.enter(Stage::Retrieving);

        let err = trace.fail(RankingError::Scoring("boom".into()));

        assert_eq!(err.kind(), "ScoringError");
        assert_eq!(trace.current(), Stage::Failed);
    }
}
