use actix_middleware::CorrelationId;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Per-request correlation id and clock.
///
/// Created once at ingress and passed by reference down the call chain;
/// nothing else holds on to it after the response is written.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    received_at: DateTime<Utc>,
    started: Instant,
}

impl RequestContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            received_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        self.correlation_id.as_str()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_independent() {
        let a = RequestContext::new(CorrelationId::generate());
        let b = RequestContext::new(CorrelationId::generate());

        assert_ne!(a.correlation_id(), b.correlation_id());
        assert!(a.received_at() <= Utc::now());
        assert!(b.elapsed() < Duration::from_secs(5));
    }
}
