use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::summary::SpecSummary;
use super::types::{JobState, SpecFormat};

/// A single step reported by the worker while a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub stage: String,
    pub progress: f32,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ProgressEntry {
    pub fn now(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            progress: progress.clamp(0.0, 100.0),
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryJobRecord {
    pub id: Uuid,
    pub state: JobState,
    pub spec_format: SpecFormat,
    pub spec_filename: String,
    pub spec_checksum: String,
    pub queue_job_id: Option<String>,
    pub progress: Vec<ProgressEntry>,
    pub result: Option<SpecSummary>,
    pub error: Option<String>,
    pub attempts: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl SummaryJobRecord {
    pub fn latest_progress(&self) -> Option<&ProgressEntry> {
        self.progress.last()
    }
}
