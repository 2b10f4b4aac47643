use actix_middleware::{CorrelationIdMiddleware, Logging};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use recsys_ranking::config::{Config, LogFormat};
use recsys_ranking::handlers::{self, AppState};
use recsys_ranking::services::{
    CandidateRetriever, EmbeddingIndex, FeatureAssembler, FeatureSchema, HistoryFilter,
    RankingModel, RankingOrchestrator, RedisFeatureStore, RedisPurchaseHistory, ServingModel,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(config.log_format);

    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Starting {} v{} on {}:{}",
        config.service.service_name,
        env!("CARGO_PKG_VERSION"),
        config.service.http_host,
        config.service.http_port
    );

    let state = web::Data::new(build_state(&config)?);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logging)
            .wrap(CorrelationIdMiddleware)
            .configure(handlers::configure)
    });
    if let Some(workers) = config.service.http_workers {
        server = server.workers(workers);
    }

    server
        .bind((config.service.http_host.as_str(), config.service.http_port))
        .context("Failed to bind HTTP server")?
        .run()
        .await
        .context("HTTP server error")
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,actix_web=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Load every read-only artifact once and wire the pipeline.
fn build_state(config: &Config) -> Result<AppState> {
    let redis_client =
        redis::Client::open(config.redis.url.as_str()).context("Failed to create Redis client")?;

    let index = Arc::new(
        EmbeddingIndex::from_path(&config.retrieval.candidate_index_path)
            .context("Failed to load candidate embedding index")?,
    );
    if index.is_empty() {
        warn!(
            path = %config.retrieval.candidate_index_path.display(),
            "Candidate index is empty, every request will return an empty ranking"
        );
    }

    let schema = match &config.model.schema_path {
        Some(path) => FeatureSchema::from_path(path).context("Failed to load feature schema")?,
        None => FeatureSchema::hm_default(),
    };
    let model = Arc::new(
        RankingModel::load(
            config.model.model_path.as_ref(),
            schema,
            config.model.require_onnx,
        )
        .context("Failed to load ranking model")?
        .with_identity(config.model.name.clone(), config.model.version.clone()),
    );
    info!(backend = model.backend_name(), "Ranking model ready");

    let timeout = config.timeouts.collaborator;
    let orchestrator = RankingOrchestrator::new(
        CandidateRetriever::new(index.clone(), config.retrieval.top_k_candidates, timeout),
        HistoryFilter::new(
            Arc::new(RedisPurchaseHistory::new(redis_client.clone(), &config.redis)),
            timeout,
        ),
        FeatureAssembler::new(
            Arc::new(RedisFeatureStore::new(redis_client, &config.redis)),
            config.features.aliases.clone(),
            timeout,
        ),
        model.clone(),
    );

    let models: Vec<Arc<dyn ServingModel>> = vec![
        index as Arc<dyn ServingModel>,
        model as Arc<dyn ServingModel>,
    ];

    Ok(AppState {
        service_name: config.service.service_name.clone(),
        orchestrator: Arc::new(orchestrator),
        models,
        request_timeout: config.timeouts.request,
    })
}
