pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use context::RequestContext;
pub use error::{CollaboratorError, RankingError};
pub use handlers::AppState;
pub use services::{
    CandidateRetriever, EmbeddingIndex, FeatureAssembler, HistoryFilter, RankingModel,
    RankingOrchestrator,
};
