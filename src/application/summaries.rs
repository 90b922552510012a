//! Submission, status and export of summarization jobs.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        export::{self, ExportError},
        jobs::enqueue_summarize_spec_job,
        repos::{JobQueue, NewSummaryJob, RepoError, SummaryJobsRepo},
    },
    domain::{
        entities::SummaryJobRecord,
        types::{ExportFormat, JobState, SpecFormat},
    },
    infra::{
        storage::{JobStorage, JobStorageError},
        telemetry::{METRIC_EXPORTS_RENDERED, METRIC_JOBS_SUBMITTED},
    },
};

pub const ENQUEUE_FAILURE_MESSAGE: &str = "Failed to enqueue job";

const SUPPORTED_CONTENT_TYPES: [&str; 6] = [
    "application/json",
    "application/yaml",
    "application/x-yaml",
    "text/yaml",
    "text/x-yaml",
    "text/plain",
];

/// An uploaded specification as received from the client.
#[derive(Debug, Clone)]
pub struct SpecUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub format: ExportFormat,
    pub filename: String,
    pub content_type: &'static str,
    pub data: Bytes,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Unsupported file type")]
    UnsupportedFileType { content_type: Option<String> },
    #[error("Uploaded file is empty")]
    EmptyPayload,
    #[error("Uploaded file is not valid UTF-8")]
    InvalidEncoding,
    #[error("job queue is unavailable")]
    QueueUnavailable(#[source] RepoError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(JobStorageError),
}

impl From<JobStorageError> for SubmitError {
    fn from(err: JobStorageError) -> Self {
        match err {
            JobStorageError::EmptyPayload => SubmitError::EmptyPayload,
            other => SubmitError::Storage(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum SummaryServiceError {
    #[error("Job not found")]
    NotFound,
    #[error("summary is not available while the job is {state}")]
    NotReady { state: JobState },
    #[error("job `{0}` succeeded without a stored summary")]
    MissingSummary(Uuid),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(#[from] JobStorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

pub struct SummaryJobService {
    jobs: Arc<dyn SummaryJobsRepo>,
    queue: Arc<dyn JobQueue>,
    storage: Arc<JobStorage>,
    max_attempts: i32,
}

impl SummaryJobService {
    pub fn new(
        jobs: Arc<dyn SummaryJobsRepo>,
        queue: Arc<dyn JobQueue>,
        storage: Arc<JobStorage>,
        max_attempts: i32,
    ) -> Self {
        Self {
            jobs,
            queue,
            storage,
            max_attempts,
        }
    }

    pub fn jobs(&self) -> &Arc<dyn SummaryJobsRepo> {
        &self.jobs
    }

    /// Validate and store the upload, then queue it for summarization.
    pub async fn submit(&self, upload: SpecUpload) -> Result<Uuid, SubmitError> {
        let content_type = upload
            .content_type
            .as_deref()
            .map(normalize_content_type)
            .filter(|ct| SUPPORTED_CONTENT_TYPES.contains(&ct.as_str()))
            .ok_or_else(|| SubmitError::UnsupportedFileType {
                content_type: upload.content_type.clone(),
            })?;

        if upload.data.is_empty() {
            return Err(SubmitError::EmptyPayload);
        }
        let text = std::str::from_utf8(&upload.data).map_err(|_| SubmitError::InvalidEncoding)?;
        let format = detect_format(&content_type, upload.filename.as_deref(), text);

        let job_id = Uuid::new_v4();
        let stored = self.storage.store_spec(job_id, format, &upload.data).await?;

        let created = self
            .jobs
            .create_job(NewSummaryJob {
                id: job_id,
                spec_format: format,
                spec_filename: upload
                    .filename
                    .clone()
                    .unwrap_or_else(|| format!("spec.{}", format.extension())),
                spec_checksum: stored.checksum,
            })
            .await;
        if let Err(err) = created {
            if let Err(cleanup_err) = self.storage.remove_job(job_id).await {
                warn!(
                    target = "application::summaries::submit",
                    job_id = %job_id,
                    error = %cleanup_err,
                    "failed to remove stored specification"
                );
            }
            return Err(err.into());
        }

        match enqueue_summarize_spec_job(self.queue.as_ref(), job_id, self.max_attempts).await {
            Ok(queue_job_id) => {
                // The job is already queued; a missing queue id only affects diagnostics.
                if let Err(err) = self.jobs.set_queue_job_id(job_id, &queue_job_id).await {
                    warn!(
                        target = "application::summaries::submit",
                        job_id = %job_id,
                        queue_job_id = %queue_job_id,
                        error = %err,
                        "failed to record queue job id"
                    );
                }
                counter!(METRIC_JOBS_SUBMITTED).increment(1);
                info!(
                    target = "application::summaries::submit",
                    job_id = %job_id,
                    queue_job_id = %queue_job_id,
                    format = format.as_str(),
                    size_bytes = stored.size_bytes,
                    "specification queued for summarization"
                );
                Ok(job_id)
            }
            Err(err) => {
                warn!(
                    target = "application::summaries::submit",
                    job_id = %job_id,
                    error = %err,
                    "failed to enqueue summarization job"
                );
                if let Err(mark_err) = self.jobs.mark_failed(job_id, ENQUEUE_FAILURE_MESSAGE).await
                {
                    warn!(
                        target = "application::summaries::submit",
                        job_id = %job_id,
                        error = %mark_err,
                        "failed to record enqueue failure"
                    );
                }
                Err(SubmitError::QueueUnavailable(err))
            }
        }
    }

    pub async fn status(&self, job_id: Uuid) -> Result<SummaryJobRecord, SummaryServiceError> {
        self.jobs
            .find_job(job_id)
            .await?
            .ok_or(SummaryServiceError::NotFound)
    }

    /// Render the job's summary, reusing a previously rendered file when present.
    pub async fn export(
        &self,
        job_id: Uuid,
        format: ExportFormat,
    ) -> Result<ExportedDocument, SummaryServiceError> {
        let record = self.status(job_id).await?;
        if record.state != JobState::Succeeded {
            return Err(SummaryServiceError::NotReady {
                state: record.state,
            });
        }

        let artifact = export::artifact_name(format);
        let data = match self.storage.read_artifact(job_id, &artifact).await? {
            Some(cached) => cached,
            None => {
                let summary = record
                    .result
                    .as_ref()
                    .ok_or(SummaryServiceError::MissingSummary(job_id))?;
                let rendered = export::render(summary, format)?;
                counter!(METRIC_EXPORTS_RENDERED, "format" => format.extension()).increment(1);
                if let Err(err) = self
                    .storage
                    .write_artifact(job_id, &artifact, &rendered)
                    .await
                {
                    warn!(
                        target = "application::summaries::export",
                        job_id = %job_id,
                        artifact = %artifact,
                        error = %err,
                        "failed to cache rendered export"
                    );
                }
                Bytes::from(rendered)
            }
        };

        Ok(ExportedDocument {
            format,
            filename: export::download_filename(job_id, format),
            content_type: format.content_type(),
            data,
        })
    }
}

fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn detect_format(content_type: &str, filename: Option<&str>, text: &str) -> SpecFormat {
    match content_type {
        "application/json" => return SpecFormat::Json,
        "text/plain" => {}
        _ => return SpecFormat::Yaml,
    }

    let from_extension = filename
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| SpecFormat::try_from(ext).ok());

    from_extension.unwrap_or_else(|| {
        if text.trim_start().starts_with('{') {
            SpecFormat::Json
        } else {
            SpecFormat::Yaml
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(
            normalize_content_type("Application/JSON; charset=utf-8"),
            "application/json"
        );
    }

    #[test]
    fn plain_text_uploads_use_extension_then_sniffing() {
        assert_eq!(
            detect_format("text/plain", Some("api.json"), "openapi: 3"),
            SpecFormat::Json
        );
        assert_eq!(
            detect_format("text/plain", Some("api.yml"), "{}"),
            SpecFormat::Yaml
        );
        assert_eq!(
            detect_format("text/plain", None, "  {\"openapi\": \"3\"}"),
            SpecFormat::Json
        );
        assert_eq!(
            detect_format("text/plain", Some("spec"), "openapi: 3"),
            SpecFormat::Yaml
        );
        assert_eq!(
            detect_format("text/x-yaml", Some("api.json"), "{}"),
            SpecFormat::Yaml
        );
    }
}
