//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ProgressEntry, SummaryJobRecord};
use crate::domain::summary::SpecSummary;
use crate::domain::types::{JobType, SpecFormat};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewSummaryJob {
    pub id: Uuid,
    pub spec_format: SpecFormat,
    pub spec_filename: String,
    pub spec_checksum: String,
}

/// Bookkeeping for summarization jobs.
///
/// Writers that change `state` only touch rows that are not yet terminal; a
/// call against a finished job returns the stored record unchanged.
#[async_trait]
pub trait SummaryJobsRepo: Send + Sync {
    async fn create_job(&self, job: NewSummaryJob) -> Result<SummaryJobRecord, RepoError>;

    async fn find_job(&self, id: Uuid) -> Result<Option<SummaryJobRecord>, RepoError>;

    async fn set_queue_job_id(&self, id: Uuid, queue_job_id: &str) -> Result<(), RepoError>;

    /// Move the job to `processing` and bump its attempt counter.
    async fn mark_processing(&self, id: Uuid) -> Result<SummaryJobRecord, RepoError>;

    async fn record_progress(&self, id: Uuid, entry: ProgressEntry) -> Result<(), RepoError>;

    async fn mark_succeeded(
        &self,
        id: Uuid,
        summary: &SpecSummary,
        entry: ProgressEntry,
    ) -> Result<SummaryJobRecord, RepoError>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<SummaryJobRecord, RepoError>;

    /// Delete records last touched before `cutoff`, returning their ids.
    async fn delete_expired(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewQueueJob {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

/// Producer side of the background queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError>;
}
