/// Ranking API Handlers
///
/// HTTP surface of the serving container: prediction, liveness, readiness
/// and model metadata.
use actix_middleware::CorrelationId;
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, Instrument, Span};

use crate::context::RequestContext;
use crate::error::{RankingError, Result};
use crate::models::RankingRequest;
use crate::services::pipeline::RankingOrchestrator;
use crate::services::ranking::{ModelDescription, ServingModel};

/// Shared, read-only state for every worker.
pub struct AppState {
    pub service_name: String,
    pub orchestrator: Arc<RankingOrchestrator>,
    pub models: Vec<Arc<dyn ServingModel>>,
    pub request_timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub models: Vec<ModelDescription>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(predict)
        .service(health)
        .service(ready)
        .service(model_info);
}

/// POST /predict
///
/// Body: `{"instances": [{"customer_id", "month_sin", "month_cos", "query_emb"}]}`.
/// Only the first instance is ranked.
#[post("/predict")]
pub async fn predict(
    correlation_id: CorrelationId,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = RequestContext::new(correlation_id);
    let span = predict_span(&ctx);

    async move {
        let request = parse_request(&body, state.orchestrator.retriever().dimension())?;
        debug!(
            customer_id = %request.customer_id,
            embedding_dim = request.query_embedding.len(),
            "Request validated"
        );

        let response = tokio::time::timeout(
            state.request_timeout,
            state.orchestrator.rank(&ctx, &request),
        )
        .await
        .map_err(|_| RankingError::Timeout(state.request_timeout))??;

        Ok(HttpResponse::Ok().json(response))
    }
    .instrument(span)
    .await
}

fn predict_span(ctx: &RequestContext) -> Span {
    info_span!(
        "predict",
        correlation_id = ctx.correlation_id(),
        received_at = %ctx.received_at().to_rfc3339()
    )
}

/// GET /health
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// GET /ready
/// Ready once the candidate index holds at least one embedding.
#[get("/ready")]
pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    let candidates = state.orchestrator.retriever().candidate_count();
    let status = if candidates > 0 { "ready" } else { "not_ready" };
    let body = json!({
        "status": status,
        "service": state.service_name,
        "candidates": candidates,
    });

    if candidates > 0 {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// GET /model
#[get("/model")]
pub async fn model_info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ModelInfoResponse {
        models: state.models.iter().map(|m| m.describe()).collect(),
    })
}

#[derive(Debug, Deserialize)]
struct PredictBody {
    instances: Vec<PredictInstance>,
}

#[derive(Debug, Deserialize)]
struct PredictInstance {
    customer_id: String,
    month_sin: f64,
    month_cos: f64,
    query_emb: Vec<f64>,
}

/// Validate the raw body into a `RankingRequest`. Runs before any
/// collaborator is touched.
pub fn parse_request(body: &[u8], expected_dimension: Option<usize>) -> Result<RankingRequest> {
    let payload: PredictBody = serde_json::from_slice(body)
        .map_err(|e| RankingError::Validation(format!("invalid request body: {}", e)))?;

    let instance = payload
        .instances
        .into_iter()
        .next()
        .ok_or_else(|| RankingError::Validation("'instances' must not be empty".to_string()))?;

    if instance.customer_id.trim().is_empty() {
        return Err(RankingError::Validation(
            "'customer_id' must not be empty".to_string(),
        ));
    }
    if !instance.month_sin.is_finite() || !instance.month_cos.is_finite() {
        return Err(RankingError::Validation(
            "'month_sin' and 'month_cos' must be finite".to_string(),
        ));
    }
    if instance.query_emb.is_empty() {
        return Err(RankingError::Validation(
            "'query_emb' must not be empty".to_string(),
        ));
    }

    let query_embedding: Vec<f32> = instance.query_emb.iter().map(|&v| v as f32).collect();
    if let Some(i) = query_embedding.iter().position(|v| !v.is_finite()) {
        return Err(RankingError::Validation(format!(
            "'query_emb[{}]' is not a finite number",
            i
        )));
    }

    if let Some(expected) = expected_dimension {
        if query_embedding.len() != expected {
            return Err(RankingError::Validation(format!(
                "'query_emb' has {} dimensions, expected {}",
                query_embedding.len(),
                expected
            )));
        }
    }

    Ok(RankingRequest {
        customer_id: instance.customer_id,
        query_embedding,
        month_sin: instance.month_sin,
        month_cos: instance.month_cos,
    })
}
