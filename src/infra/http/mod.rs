//! HTTP surface: router assembly and shared middleware.

pub mod api;
mod middleware;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware};
use tower_http::cors::{Any, CorsLayer};

use crate::application::summaries::SummaryJobService;

pub use api::rate_limit::UploadRateLimiter;

#[derive(Clone)]
pub struct HttpState {
    pub summaries: Arc<SummaryJobService>,
    pub rate_limiter: UploadRateLimiter,
}

/// Assemble the API router with body limits, CORS and response logging.
pub fn build_router(state: HttpState, max_request_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::build_api_router(state.clone())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
