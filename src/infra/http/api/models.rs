use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    entities::{ProgressEntry, SummaryJobRecord},
    summary::SpecSummary,
    types::JobState,
};

pub const STILL_PROCESSING_DETAIL: &str = "Job is still processing";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
}

/// Full job document served by the state endpoint.
#[derive(Debug, Serialize)]
pub struct JobStateResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub spec_filename: String,
    pub spec_format: &'static str,
    pub attempts: i32,
    pub progress: Vec<ProgressEntry>,
    pub latest_progress: Option<ProgressEntry>,
    pub result: Option<SpecSummary>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl From<SummaryJobRecord> for JobStateResponse {
    fn from(record: SummaryJobRecord) -> Self {
        let latest_progress = record.latest_progress().cloned();
        Self {
            job_id: record.id,
            state: record.state,
            spec_filename: record.spec_filename,
            spec_format: record.spec_format.as_str(),
            attempts: record.attempts,
            progress: record.progress,
            latest_progress,
            result: record.result,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryPendingResponse {
    pub status: JobState,
    pub detail: &'static str,
    pub progress: Option<ProgressEntry>,
}

#[derive(Debug, Serialize)]
pub struct SummaryReadyResponse {
    pub status: JobState,
    pub result: SpecSummary,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub file_format: Option<String>,
}
