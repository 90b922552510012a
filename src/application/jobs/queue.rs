use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{JobQueue, NewQueueJob, RepoError},
    domain::types::JobType,
};

use super::summarize::SummarizeSpecJobPayload;

/// Enqueue a job with the provided payload, returning the queue-assigned id.
pub async fn enqueue_job<Q, P>(
    queue: &Q,
    job_type: JobType,
    payload: &P,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
    priority: i32,
) -> Result<String, RepoError>
where
    Q: JobQueue + ?Sized,
    P: serde::Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    let record = NewQueueJob {
        job_type,
        payload,
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
        priority,
    };

    queue.enqueue_job(record).await
}

pub async fn enqueue_summarize_spec_job<Q: JobQueue + ?Sized>(
    queue: &Q,
    job_id: Uuid,
    max_attempts: i32,
) -> Result<String, RepoError> {
    enqueue_job(
        queue,
        JobType::SummarizeSpec,
        &SummarizeSpecJobPayload { job_id },
        None,
        max_attempts,
        0,
    )
    .await
}
