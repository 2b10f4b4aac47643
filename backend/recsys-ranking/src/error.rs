use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankingError>;

/// Request-level failures of the ranking pipeline.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Retrieval(String),

    #[error("{0}")]
    FeatureSchema(String),

    #[error("{0}")]
    Scoring(String),

    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        message: String,
    },

    #[error("request exceeded {0:?}")]
    Timeout(Duration),
}

impl RankingError {
    /// Stable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            RankingError::Validation(_) => "ValidationError",
            RankingError::Retrieval(_) => "RetrievalError",
            RankingError::FeatureSchema(_) => "FeatureSchemaError",
            RankingError::Scoring(_) => "ScoringError",
            RankingError::CollaboratorUnavailable { .. } => "CollaboratorUnavailable",
            RankingError::Timeout(_) => "Timeout",
        }
    }

    pub fn collaborator(collaborator: &'static str, err: CollaboratorError) -> Self {
        RankingError::CollaboratorUnavailable {
            collaborator,
            message: err.to_string(),
        }
    }
}

/// Failure of a single call to an external store.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("candidate index is empty")]
    EmptyIndex,

    #[error("malformed data: {0}")]
    Malformed(String),
}

impl From<redis::RedisError> for CollaboratorError {
    fn from(err: redis::RedisError) -> Self {
        CollaboratorError::Unavailable(err.to_string())
    }
}

/// Error body; `ranking` is always present so callers can parse one shape.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub ranking: Vec<(f32, String)>,
}

impl ResponseError for RankingError {
    fn status_code(&self) -> StatusCode {
        match self {
            RankingError::Validation(_) => StatusCode::BAD_REQUEST,
            RankingError::FeatureSchema(_) | RankingError::Scoring(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RankingError::Retrieval(_) | RankingError::CollaboratorUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RankingError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: format!("{}: {}", self.kind(), self),
            ranking: Vec::new(),
        })
    }
}
