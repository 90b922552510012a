use std::{sync::Arc, time::Instant};

use apalis::prelude::{Data, Error as ApalisError};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        analysis::ProgressSink,
        repos::{RepoError, SummaryJobsRepo},
    },
    domain::{entities::ProgressEntry, openapi::parse_spec, types::JobState},
    infra::{
        storage::SUMMARY_FILE,
        telemetry::{METRIC_JOB_DURATION_MS, METRIC_JOBS_FAILED, METRIC_JOBS_SUCCEEDED},
    },
};

use super::context::{JobWorkerContext, job_failed};

pub const PARSING_STAGE: &str = "parsing";
pub const COMPLETE_STAGE: &str = "complete";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeSpecJobPayload {
    pub job_id: Uuid,
}

#[derive(Debug, Error)]
pub enum SummarizeSpecJobError {
    #[error("summary job `{0}` does not exist")]
    MissingJob(Uuid),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub async fn process_summarize_spec_job(
    payload: SummarizeSpecJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    summarize_spec(ctx, payload.job_id)
        .await
        .map(|_| ())
        .map_err(|err| {
            error!(
                target = "application::jobs::process_summarize_spec_job",
                job_id = %payload.job_id,
                error = %err,
                "summary job could not be processed"
            );
            job_failed(err)
        })
}

/// Drive one job to a terminal state and return that state.
///
/// Parse and completion failures are recorded on the job. Only bookkeeping
/// failures are returned so the queue can redeliver.
pub async fn summarize_spec(
    ctx: &JobWorkerContext,
    job_id: Uuid,
) -> Result<JobState, SummarizeSpecJobError> {
    let started = Instant::now();

    if let Some(state) = blocked_transition(ctx, job_id, JobState::Processing).await? {
        return Ok(state);
    }

    let record = ctx.jobs.mark_processing(job_id).await?;
    if record.state != JobState::Processing {
        return Ok(record.state);
    }
    ctx.jobs
        .record_progress(
            job_id,
            ProgressEntry::now(PARSING_STAGE, 0.0, "Parsing specification"),
        )
        .await?;

    let content = match ctx.storage.read_spec(job_id, record.spec_format).await {
        Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(_) => {
                return fail(ctx, job_id, "Stored specification is not valid UTF-8", started)
                    .await;
            }
        },
        Err(err) => {
            let message = format!("Failed to read stored specification: {err}");
            return fail(ctx, job_id, &message, started).await;
        }
    };

    let spec = match parse_spec(&content, record.spec_format) {
        Ok(spec) => spec,
        Err(err) => {
            let message = format!("Invalid OpenAPI specification: {err}");
            return fail(ctx, job_id, &message, started).await;
        }
    };

    ctx.jobs
        .record_progress(
            job_id,
            ProgressEntry::now(
                PARSING_STAGE,
                100.0,
                format!("Parsed {} endpoints", spec.endpoints.len()),
            ),
        )
        .await?;

    let sink = RepoProgressSink {
        jobs: Arc::clone(&ctx.jobs),
        job_id,
    };
    let summary = match ctx.analyzer.analyze(&spec, &sink).await {
        Ok(summary) => summary,
        Err(err) => return fail(ctx, job_id, &err.detail(), started).await,
    };

    if let Some(state) = blocked_transition(ctx, job_id, JobState::Succeeded).await? {
        return Ok(state);
    }

    match serde_json::to_vec_pretty(&summary) {
        Ok(json) => {
            if let Err(err) = ctx.storage.write_artifact(job_id, SUMMARY_FILE, &json).await {
                warn!(
                    target = "application::jobs::summarize_spec",
                    job_id = %job_id,
                    error = %err,
                    "failed to write summary file"
                );
            }
        }
        Err(err) => warn!(
            target = "application::jobs::summarize_spec",
            job_id = %job_id,
            error = %err,
            "failed to serialize summary file"
        ),
    }

    let finished = ctx
        .jobs
        .mark_succeeded(
            job_id,
            &summary,
            ProgressEntry::now(COMPLETE_STAGE, 100.0, "Summary generated"),
        )
        .await?;

    counter!(METRIC_JOBS_SUCCEEDED).increment(1);
    histogram!(METRIC_JOB_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
    info!(
        target = "application::jobs::summarize_spec",
        job_id = %job_id,
        endpoints = summary.endpoints.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "summary generated"
    );

    Ok(finished.state)
}

async fn fail(
    ctx: &JobWorkerContext,
    job_id: Uuid,
    message: &str,
    started: Instant,
) -> Result<JobState, SummarizeSpecJobError> {
    if let Some(state) = blocked_transition(ctx, job_id, JobState::Failed).await? {
        return Ok(state);
    }
    let record = ctx.jobs.mark_failed(job_id, message).await?;
    counter!(METRIC_JOBS_FAILED).increment(1);
    histogram!(METRIC_JOB_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
    warn!(
        target = "application::jobs::summarize_spec",
        job_id = %job_id,
        error = message,
        "summary job failed"
    );
    Ok(record.state)
}

/// Re-read the job and check that it may still move to `next`.
///
/// Returns the current state when it may not, which happens when another
/// delivery of the same job already finished it.
async fn blocked_transition(
    ctx: &JobWorkerContext,
    job_id: Uuid,
    next: JobState,
) -> Result<Option<JobState>, SummarizeSpecJobError> {
    let record = ctx
        .jobs
        .find_job(job_id)
        .await?
        .ok_or(SummarizeSpecJobError::MissingJob(job_id))?;

    match record.state.ensure_transition(next) {
        Ok(()) => Ok(None),
        Err(err) => {
            info!(
                target = "application::jobs::summarize_spec",
                job_id = %job_id,
                state = %record.state,
                reason = %err,
                "job already finished; skipping state write"
            );
            Ok(Some(record.state))
        }
    }
}

struct RepoProgressSink {
    jobs: Arc<dyn SummaryJobsRepo>,
    job_id: Uuid,
}

#[async_trait]
impl ProgressSink for RepoProgressSink {
    async fn report(&self, entry: ProgressEntry) {
        if let Err(err) = self.jobs.record_progress(self.job_id, entry).await {
            warn!(
                target = "application::jobs::summarize_spec",
                job_id = %self.job_id,
                error = %err,
                "failed to record progress"
            );
        }
    }
}
