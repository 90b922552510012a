use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::repos::RepoError;
use crate::application::summaries::SpecUpload;
use crate::domain::types::{ExportFormat, JobState};
use crate::infra::http::HttpState;
use crate::infra::http::api::error::{
    ApiError, codes, repo_to_api, submit_to_api, summary_to_api,
};
use crate::infra::http::api::models::{
    ExportQuery, JobStateResponse, STILL_PROCESSING_DETAIL, SummaryPendingResponse,
    SummaryReadyResponse, UploadResponse,
};

use super::parse_job_id;

const UPLOAD_FIELD: &str = "file";

pub async fn upload_spec(
    State(state): State<HttpState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_to_api)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_to_api)?;
        upload = Some(SpecUpload {
            filename,
            content_type,
            data,
        });
        break;
    }

    let upload = upload.ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::MISSING_FILE,
            "Multipart field `file` is required",
        )
    })?;

    let job_id = state
        .summaries
        .submit(upload)
        .await
        .map_err(submit_to_api)?;

    Ok(Json(UploadResponse { job_id }))
}

pub async fn job_state(
    State(state): State<HttpState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&raw_id)?;
    let record = state
        .summaries
        .status(job_id)
        .await
        .map_err(summary_to_api)?;

    let status = match record.state {
        JobState::Succeeded => StatusCode::OK,
        JobState::Queued | JobState::Processing => StatusCode::ACCEPTED,
        JobState::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Ok((status, Json(JobStateResponse::from(record))).into_response())
}

pub async fn job_summary(
    State(state): State<HttpState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&raw_id)?;
    let record = state
        .summaries
        .status(job_id)
        .await
        .map_err(summary_to_api)?;

    match record.state {
        JobState::Queued | JobState::Processing => Ok((
            StatusCode::ACCEPTED,
            Json(SummaryPendingResponse {
                status: record.state,
                detail: STILL_PROCESSING_DETAIL,
                progress: record.latest_progress().cloned(),
            }),
        )
            .into_response()),
        JobState::Failed => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::JOB_FAILED,
            record
                .error
                .unwrap_or_else(|| "Job failed without an error message".to_string()),
        )),
        JobState::Succeeded => match record.result {
            Some(result) => Ok(Json(SummaryReadyResponse {
                status: JobState::Succeeded,
                result,
            })
            .into_response()),
            None => Err(repo_to_api(RepoError::Integrity {
                message: format!("job {job_id} succeeded without a summary"),
            })),
        },
    }
}

pub async fn export_summary(
    State(state): State<HttpState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = match query.file_format.as_deref() {
        None => ExportFormat::Markdown,
        Some(value) => ExportFormat::try_from(value).map_err(|_| {
            ApiError::bad_request(
                codes::INVALID_FORMAT,
                format!("Unsupported export format `{value}`; use md, html or docx"),
            )
        })?,
    };
    let job_id = parse_job_id(&raw_id)?;

    let document = state
        .summaries
        .export(job_id, format)
        .await
        .map_err(summary_to_api)?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        document.filename
    ))
    .map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::EXPORT,
            "Failed to build download headers",
        )
        .with_diagnostic(err.to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(document.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.data,
    )
        .into_response())
}

fn multipart_to_api(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Uploaded file exceeds the size limit",
        )
        .with_diagnostic(err.body_text());
    }
    ApiError::bad_request(codes::BAD_REQUEST, "Invalid multipart payload")
        .with_diagnostic(err.body_text())
}
