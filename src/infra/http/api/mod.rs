pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use super::HttpState;

pub fn build_api_router(state: HttpState) -> Router<HttpState> {
    let uploads = Router::new()
        .route("/api/spec/upload", post(handlers::upload_spec))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            rate_limit::upload_rate_limit,
        ));

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        .route("/api/spec/{job_id}/state", get(handlers::job_state))
        .route("/api/spec/{job_id}/summary", get(handlers::job_summary))
        .route("/api/spec/{job_id}/export", get(handlers::export_summary))
        .merge(uploads)
}
