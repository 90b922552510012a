use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::application::summaries::{SubmitError, SummaryServiceError};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub detail: String,
    pub code: &'static str,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNSUPPORTED_FILE_TYPE: &str = "unsupported_file_type";
    pub const EMPTY_FILE: &str = "empty_file";
    pub const INVALID_ENCODING: &str = "invalid_encoding";
    pub const MISSING_FILE: &str = "missing_file";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const NOT_FOUND: &str = "not_found";
    pub const NOT_READY: &str = "summary_not_ready";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const QUEUE_UNAVAILABLE: &str = "queue_unavailable";
    pub const JOB_FAILED: &str = "job_failed";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const STORAGE: &str = "storage_error";
    pub const EXPORT: &str = "export_error";
    pub const UNAVAILABLE: &str = "service_unavailable";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    detail: String,
    diagnostic: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
            diagnostic: None,
        }
    }

    /// Internal detail logged by the response middleware but never sent to the client.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn bad_request(code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, detail)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "Job not found")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let body = ApiErrorBody {
            detail: format!("Rate limit exceeded; retry after {retry_after} seconds"),
            code: codes::RATE_LIMITED,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        ErrorReport::from_message(
            "infra::http::api::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let logged = format!(
            "{}: {}",
            self.code,
            self.diagnostic.as_deref().unwrap_or(&self.detail)
        );
        let body = ApiErrorBody {
            detail: self.detail,
            code: self.code,
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message("infra::http::api", self.status, logged).attach(&mut response);
        response
    }
}

pub fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found(),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
        ),
        other => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Failed to access job records",
        )
        .with_diagnostic(other.to_string()),
    }
}

pub fn submit_to_api(err: SubmitError) -> ApiError {
    match err {
        SubmitError::UnsupportedFileType { content_type } => ApiError::bad_request(
            codes::UNSUPPORTED_FILE_TYPE,
            "Unsupported file type. Please upload a JSON or YAML file.",
        )
        .with_diagnostic(format!(
            "content type {}",
            content_type.as_deref().unwrap_or("<none>")
        )),
        SubmitError::EmptyPayload => {
            ApiError::bad_request(codes::EMPTY_FILE, "Uploaded file is empty")
        }
        SubmitError::InvalidEncoding => ApiError::bad_request(
            codes::INVALID_ENCODING,
            "Uploaded file must be UTF-8 encoded",
        ),
        SubmitError::QueueUnavailable(source) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::QUEUE_UNAVAILABLE,
            crate::application::summaries::ENQUEUE_FAILURE_MESSAGE,
        )
        .with_diagnostic(source.to_string()),
        SubmitError::Repo(source) => repo_to_api(source),
        SubmitError::Storage(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::STORAGE,
            "Failed to store uploaded file",
        )
        .with_diagnostic(source.to_string()),
    }
}

pub fn summary_to_api(err: SummaryServiceError) -> ApiError {
    match err {
        SummaryServiceError::NotFound => ApiError::not_found(),
        SummaryServiceError::NotReady { state } => ApiError::new(
            StatusCode::CONFLICT,
            codes::NOT_READY,
            format!("Summary is not available; job is {state}"),
        ),
        SummaryServiceError::MissingSummary(job_id) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::EXPORT,
            "Summary is missing for a completed job",
        )
        .with_diagnostic(format!("job {job_id} has no stored summary")),
        SummaryServiceError::Repo(source) => repo_to_api(source),
        SummaryServiceError::Storage(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::STORAGE,
            "Failed to read job files",
        )
        .with_diagnostic(source.to_string()),
        SummaryServiceError::Export(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::EXPORT,
            "Failed to render export",
        )
        .with_diagnostic(source.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::types::JobState;

    use super::*;

    #[test]
    fn not_ready_maps_to_conflict() {
        let err = summary_to_api(SummaryServiceError::NotReady {
            state: JobState::Processing,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn queue_failures_map_to_service_unavailable() {
        let err = submit_to_api(SubmitError::QueueUnavailable(RepoError::Timeout));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn diagnostics_are_logged_but_not_returned() {
        let response = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, codes::REPO, "public")
            .with_diagnostic("secret connection string")
            .into_response();

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("error report attached");
        assert!(report.messages[0].contains("secret connection string"));
    }
}
