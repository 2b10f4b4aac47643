use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub retrieval: RetrievalConfig,
    pub model: ModelConfig,
    pub features: FeatureConfig,
    pub timeouts: TimeoutConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_host: String,
    pub http_port: u16,
    pub http_workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub article_key_prefix: String,
    pub customer_key_prefix: String,
    pub purchases_key_suffix: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub candidate_index_path: PathBuf,
    pub top_k_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_path: Option<PathBuf>,
    pub schema_path: Option<PathBuf>,
    pub require_onnx: bool,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureConfig {
    /// `(target, source)`: copy `source` into `target` when `target` is absent.
    pub aliases: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub collaborator: Duration,
    pub request: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Flat view of the process environment, one field per variable.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    #[serde(default = "default_service_name")]
    service_name: String,
    #[serde(default = "default_http_host")]
    http_host: String,
    http_port: Option<u16>,
    aip_http_port: Option<u16>,
    http_workers: Option<usize>,

    #[serde(default = "default_redis_url")]
    redis_url: String,
    #[serde(default = "default_article_prefix")]
    article_key_prefix: String,
    #[serde(default = "default_customer_prefix")]
    customer_key_prefix: String,
    #[serde(default = "default_purchases_suffix")]
    purchases_key_suffix: String,

    #[serde(default = "default_index_path")]
    candidate_index_path: PathBuf,
    #[serde(default = "default_top_k")]
    top_k_candidates: usize,

    ranking_model_path: Option<PathBuf>,
    ranking_schema_path: Option<PathBuf>,
    #[serde(default)]
    require_onnx_model: bool,
    #[serde(default = "default_model_name")]
    model_name: String,
    #[serde(default = "default_model_version")]
    model_version: String,

    #[serde(default = "default_feature_aliases")]
    feature_aliases: String,

    #[serde(default = "default_collaborator_timeout_ms")]
    collaborator_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,

    #[serde(default)]
    log_format: LogFormat,
}

fn default_service_name() -> String {
    "recsys-ranking".to_string()
}
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_article_prefix() -> String {
    "article".to_string()
}
fn default_customer_prefix() -> String {
    "customer".to_string()
}
fn default_purchases_suffix() -> String {
    "purchases".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("data/candidate_embeddings.jsonl")
}
fn default_top_k() -> usize {
    100
}
fn default_model_name() -> String {
    "ranking".to_string()
}
fn default_model_version() -> String {
    "default".to_string()
}
fn default_feature_aliases() -> String {
    "colour_group_name_right=colour_group_name".to_string()
}
fn default_collaborator_timeout_ms() -> u64 {
    2000
}
fn default_request_timeout_ms() -> u64 {
    5000
}

const DEFAULT_HTTP_PORT: u16 = 8080;
const MAX_TOP_K: usize = 1000;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env: EnvConfig = envy::from_env()?;
        Self::from_env_config(env)
    }

    /// Build from an explicit set of variables (names as in the environment).
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: EnvConfig = envy::from_iter(vars)?;
        Self::from_env_config(env)
    }

    fn from_env_config(env: EnvConfig) -> Result<Self, ConfigError> {
        Ok(Config {
            service: ServiceConfig {
                service_name: env.service_name,
                http_host: env.http_host,
                http_port: env
                    .http_port
                    .or(env.aip_http_port)
                    .unwrap_or(DEFAULT_HTTP_PORT),
                http_workers: env.http_workers,
            },
            redis: RedisConfig {
                url: env.redis_url,
                article_key_prefix: env.article_key_prefix,
                customer_key_prefix: env.customer_key_prefix,
                purchases_key_suffix: env.purchases_key_suffix,
            },
            retrieval: RetrievalConfig {
                candidate_index_path: env.candidate_index_path,
                top_k_candidates: env.top_k_candidates,
            },
            model: ModelConfig {
                model_path: env.ranking_model_path,
                schema_path: env.ranking_schema_path,
                require_onnx: env.require_onnx_model,
                name: env.model_name,
                version: env.model_version,
            },
            features: FeatureConfig {
                aliases: parse_aliases(&env.feature_aliases)?,
            },
            timeouts: TimeoutConfig {
                collaborator: Duration::from_millis(env.collaborator_timeout_ms),
                request: Duration::from_millis(env.request_timeout_ms),
            },
            log_format: env.log_format,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.http_port == 0 {
            return Err(ConfigError::Invalid(
                "HTTP port must be greater than 0".into(),
            ));
        }

        if self.service.http_workers == Some(0) {
            return Err(ConfigError::Invalid("HTTP workers must be at least 1".into()));
        }

        if self.redis.url.is_empty() {
            return Err(ConfigError::Invalid("Redis URL is required".into()));
        }

        if self.retrieval.top_k_candidates == 0 || self.retrieval.top_k_candidates > MAX_TOP_K {
            return Err(ConfigError::Invalid(format!(
                "TOP_K_CANDIDATES must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        if self.model.require_onnx && self.model.model_path.is_none() {
            return Err(ConfigError::Invalid(
                "REQUIRE_ONNX_MODEL is set but RANKING_MODEL_PATH is not".into(),
            ));
        }

        if self.timeouts.collaborator.is_zero() || self.timeouts.request.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }

        if self.timeouts.collaborator > self.timeouts.request {
            return Err(ConfigError::Invalid(
                "COLLABORATOR_TIMEOUT_MS must not exceed REQUEST_TIMEOUT_MS".into(),
            ));
        }

        Ok(())
    }
}

/// Parse `target=source,target=source`.
fn parse_aliases(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((target, source)) if !target.trim().is_empty() && !source.trim().is_empty() => {
                Ok((target.trim().to_string(), source.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid(format!(
                "FEATURE_ALIASES entry '{}' is not target=source",
                pair
            ))),
        })
        .collect()
}
