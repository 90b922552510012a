mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use apalis::prelude::Data;
use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration, OffsetDateTime};

use introspector::application::analysis::{
    CompletionClient, CompletionError, CompletionRequest, SpecAnalyzer,
};
use introspector::application::jobs::{
    JobWorkerContext, PurgeExpiredContext, SummarizeSpecJobPayload, process_summarize_spec_job,
    purge_expired_jobs, summarize_spec,
};
use introspector::application::repos::{JobQueue, SummaryJobsRepo};
use introspector::application::summaries::{SpecUpload, SummaryJobService, SummaryServiceError};
use introspector::domain::summary::SpecSummary;
use introspector::domain::types::{ExportFormat, JobState};
use introspector::infra::storage::{JobStorage, SUMMARY_FILE};

use support::{
    InMemoryJobsRepo, PETSTORE_JSON, RecordingQueue, ScriptedCompletionClient, job_record,
};

struct Harness {
    jobs: Arc<InMemoryJobsRepo>,
    storage: Arc<JobStorage>,
    service: SummaryJobService,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(JobStorage::new(dir.path().to_path_buf()).expect("storage"));
        let jobs = Arc::new(InMemoryJobsRepo::default());
        let jobs_repo: Arc<dyn SummaryJobsRepo> = jobs.clone();
        let queue: Arc<dyn JobQueue> = Arc::new(RecordingQueue::default());
        let service = SummaryJobService::new(jobs_repo, queue, Arc::clone(&storage), 3);
        Self {
            jobs,
            storage,
            service,
            dir,
        }
    }

    fn worker(&self, client: Arc<impl CompletionClient + 'static>) -> JobWorkerContext {
        let client: Arc<dyn CompletionClient> = client;
        JobWorkerContext {
            jobs: self.jobs.clone(),
            storage: Arc::clone(&self.storage),
            analyzer: Arc::new(SpecAnalyzer::new(client, 2)),
        }
    }

    async fn submit(&self, content_type: &str, filename: &str, data: &str) -> uuid::Uuid {
        self.service
            .submit(SpecUpload {
                filename: Some(filename.to_string()),
                content_type: Some(content_type.to_string()),
                data: Bytes::from(data.to_string()),
            })
            .await
            .expect("submit")
    }
}

#[tokio::test]
async fn worker_drives_job_to_success() {
    let harness = Harness::new();
    let client = ScriptedCompletionClient::succeeding();
    let ctx = harness.worker(Arc::clone(&client));
    let job_id = harness
        .submit("application/json", "petstore.json", PETSTORE_JSON)
        .await;

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Succeeded);
    // One overview call plus one per endpoint.
    assert_eq!(client.calls.load(Ordering::SeqCst), 4);

    let record = harness.jobs.get(job_id).await.expect("record");
    assert_eq!(record.state, JobState::Succeeded);
    assert_eq!(record.attempts, 1);
    assert!(record.completed_at.is_some());
    let summary = record.result.expect("summary stored");
    assert_eq!(summary.spec_info.title, "Petstore");
    assert_eq!(summary.overview, "Overview of the API.");
    assert_eq!(summary.model, "scripted-model");
    let paths: Vec<_> = summary
        .endpoints
        .iter()
        .map(|endpoint| format!("{} {}", endpoint.method, endpoint.path))
        .collect();
    assert_eq!(paths, ["GET /pets", "POST /pets", "GET /pets/{id}"]);
    assert!(
        summary
            .endpoints
            .iter()
            .all(|endpoint| endpoint.analysis == "Endpoint analysis.")
    );

    let stages: Vec<_> = record.progress.iter().map(|p| p.stage.as_str()).collect();
    assert_eq!(stages.first(), Some(&"parsing"));
    assert_eq!(stages.last(), Some(&"complete"));
    assert_eq!(record.progress.last().map(|p| p.progress), Some(100.0));

    let file = harness
        .storage
        .read_artifact(job_id, SUMMARY_FILE)
        .await
        .expect("read artifact")
        .expect("summary file written");
    let on_disk: SpecSummary = serde_json::from_slice(&file).expect("summary json");
    assert_eq!(on_disk.endpoints.len(), 3);

    let export = harness
        .service
        .export(job_id, ExportFormat::Markdown)
        .await
        .expect("export");
    assert_eq!(export.filename, format!("api-summary-{job_id}.md"));
    let markdown = String::from_utf8(export.data.to_vec()).expect("utf8");
    assert!(markdown.contains("Overview of the API."));
}

#[tokio::test]
async fn invalid_spec_fails_without_calling_completion_service() {
    let harness = Harness::new();
    let client = ScriptedCompletionClient::succeeding();
    let ctx = harness.worker(Arc::clone(&client));
    let job_id = harness
        .submit("application/json", "broken.json", "{\"info\": {\"title\": \"x\"}")
        .await;

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Failed);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    let record = harness.jobs.get(job_id).await.expect("record");
    assert!(
        record
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("Invalid OpenAPI specification"))
    );
    assert!(record.result.is_none());
}

#[tokio::test]
async fn completion_failure_fails_the_job() {
    let harness = Harness::new();
    let client = ScriptedCompletionClient::failing(503);
    let ctx = harness.worker(client);
    let job_id = harness
        .submit("application/json", "petstore.json", PETSTORE_JSON)
        .await;

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Failed);
    let record = harness.jobs.get(job_id).await.expect("record");
    assert!(
        record
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("overview generation failed"))
    );

    let err = harness
        .service
        .export(job_id, ExportFormat::Html)
        .await
        .expect_err("failed jobs cannot be exported");
    assert!(matches!(
        err,
        SummaryServiceError::NotReady {
            state: JobState::Failed
        }
    ));
}

#[tokio::test]
async fn redelivered_terminal_job_is_left_untouched() {
    let harness = Harness::new();
    let client = ScriptedCompletionClient::succeeding();
    let ctx = harness.worker(Arc::clone(&client));
    let record = job_record(JobState::Succeeded);
    let job_id = record.id;
    harness.jobs.insert(record.clone()).await;

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Succeeded);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    let after = harness.jobs.get(job_id).await.expect("record");
    assert_eq!(after.attempts, record.attempts);
    assert_eq!(after.progress.len(), record.progress.len());
}

/// Completion client that fails the job from the outside before answering,
/// as a concurrent delivery of the same job would.
struct FinishingClient {
    jobs: Arc<InMemoryJobsRepo>,
    job_id: uuid::Uuid,
}

#[async_trait]
impl CompletionClient for FinishingClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        self.jobs
            .mark_failed(self.job_id, "finished by another worker")
            .await
            .expect("mark failed");
        Ok("Late answer.".to_string())
    }

    fn model(&self) -> &str {
        "finishing-model"
    }
}

#[tokio::test]
async fn job_finished_elsewhere_is_not_overwritten() {
    let harness = Harness::new();
    let job_id = harness
        .submit("application/json", "petstore.json", PETSTORE_JSON)
        .await;
    let ctx = harness.worker(Arc::new(FinishingClient {
        jobs: harness.jobs.clone(),
        job_id,
    }));

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Failed);
    let record = harness.jobs.get(job_id).await.expect("record");
    assert_eq!(record.error.as_deref(), Some("finished by another worker"));
    assert!(record.result.is_none());
    assert!(
        harness
            .storage
            .read_artifact(job_id, SUMMARY_FILE)
            .await
            .expect("read artifact")
            .is_none()
    );
}

#[tokio::test]
async fn interrupted_job_is_resumed_on_redelivery() {
    let harness = Harness::new();
    let client = ScriptedCompletionClient::succeeding();
    let ctx = harness.worker(Arc::clone(&client));
    let job_id = harness
        .submit("application/json", "petstore.json", PETSTORE_JSON)
        .await;
    harness.jobs.mark_processing(job_id).await.expect("processing");

    let state = summarize_spec(&ctx, job_id).await.expect("job processed");

    assert_eq!(state, JobState::Succeeded);
    let record = harness.jobs.get(job_id).await.expect("record");
    assert_eq!(record.attempts, 2);
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn summarize_job_future_is_send() {
    let harness = Harness::new();
    let ctx = harness.worker(ScriptedCompletionClient::succeeding());

    let job = process_summarize_spec_job(
        SummarizeSpecJobPayload {
            job_id: uuid::Uuid::new_v4(),
        },
        Data::new(ctx),
    );

    assert_send(&job);
}

#[tokio::test]
async fn missing_job_is_reported_to_the_queue() {
    let harness = Harness::new();
    let ctx = harness.worker(ScriptedCompletionClient::succeeding());

    let result = summarize_spec(&ctx, uuid::Uuid::new_v4()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn purge_removes_expired_records_and_files() {
    let harness = Harness::new();
    let stale = harness
        .submit("application/json", "stale.json", PETSTORE_JSON)
        .await;
    let fresh = harness
        .submit("application/json", "fresh.json", PETSTORE_JSON)
        .await;

    let now = OffsetDateTime::now_utc();
    harness.jobs.touch(stale, now - Duration::hours(30)).await;

    let ctx = PurgeExpiredContext {
        jobs: harness.jobs.clone(),
        storage: Arc::clone(&harness.storage),
        retention: Duration::hours(24),
    };
    let purged = purge_expired_jobs(&ctx, now).await.expect("purge");

    assert_eq!(purged, 1);
    assert!(harness.jobs.get(stale).await.is_none());
    assert!(harness.jobs.get(fresh).await.is_some());
    assert!(!harness.dir.path().join(stale.to_string()).exists());
    assert!(harness.dir.path().join(fresh.to_string()).exists());
}
