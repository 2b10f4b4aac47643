//! # Actix Middleware Library
//!
//! Shared middleware components for the recsys Actix services
//!
//! ## Modules
//! - `correlation_id`: per-request correlation id extraction and propagation
//! - `logging`: structured request/response logging

pub mod correlation_id;
pub mod logging;

pub use correlation_id::{
    get_correlation_id, CorrelationId, CorrelationIdMiddleware, CORRELATION_HEADER,
    REQUEST_ID_HEADER,
};
pub use logging::Logging;
