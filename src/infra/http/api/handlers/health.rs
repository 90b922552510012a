use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::infra::http::HttpState;
use crate::infra::http::api::models::{DatabaseHealth, HealthResponse, ReadinessResponse};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn readiness(State(state): State<HttpState>) -> Response {
    match state.summaries.jobs().health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "healthy",
                database: DatabaseHealth {
                    status: "healthy",
                    detail: None,
                },
            }),
        )
            .into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unhealthy",
                    database: DatabaseHealth {
                        status: "unhealthy",
                        detail: Some("database did not answer".to_string()),
                    },
                }),
            )
                .into_response();
            ErrorReport::from_error(
                "infra::http::api::readiness",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
