//! In-memory adapters shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::{OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;
use uuid::Uuid;

use introspector::application::analysis::{CompletionClient, CompletionError, CompletionRequest};
use introspector::application::repos::{
    JobQueue, NewQueueJob, NewSummaryJob, RepoError, SummaryJobsRepo,
};
use introspector::domain::entities::{ProgressEntry, SummaryJobRecord};
use introspector::domain::summary::{EndpointSummary, SpecInfo, SpecSummary};
use introspector::domain::types::{JobState, SpecFormat};

pub const PETSTORE_JSON: &str = r#"{
  "openapi": "3.0.0",
  "info": {"title": "Petstore", "version": "1.0.0", "description": "Pets as a service"},
  "paths": {
    "/pets": {
      "get": {"summary": "List pets", "responses": {"200": {"description": "ok"}}},
      "post": {"summary": "Create pet", "responses": {"201": {"description": "created"}}}
    },
    "/pets/{id}": {
      "get": {
        "summary": "Get pet",
        "parameters": [{"name": "id", "in": "path", "required": true}],
        "responses": {"200": {"description": "ok"}, "404": {"description": "missing"}}
      }
    }
  }
}"#;

pub const PETSTORE_YAML: &str = "openapi: 3.0.0
info:
  title: Petstore
  version: 1.0.0
paths:
  /pets:
    get:
      summary: List pets
      responses:
        '200':
          description: ok
";

#[derive(Default)]
pub struct InMemoryJobsRepo {
    jobs: Mutex<HashMap<Uuid, SummaryJobRecord>>,
    pub unhealthy: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_set_queue_id: AtomicBool,
}

impl InMemoryJobsRepo {
    pub async fn insert(&self, record: SummaryJobRecord) {
        self.jobs.lock().await.insert(record.id, record);
    }

    pub async fn get(&self, id: Uuid) -> Option<SummaryJobRecord> {
        self.jobs.lock().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<SummaryJobRecord> {
        self.jobs.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn touch(&self, id: Uuid, updated_at: OffsetDateTime) {
        if let Some(record) = self.jobs.lock().await.get_mut(&id) {
            record.updated_at = updated_at;
        }
    }

    async fn transition<F>(&self, id: Uuid, next: JobState, apply: F) -> Result<SummaryJobRecord, RepoError>
    where
        F: FnOnce(&mut SummaryJobRecord),
    {
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&id).ok_or(RepoError::NotFound)?;
        if record.state.ensure_transition(next).is_ok() {
            record.state = next;
            record.updated_at = OffsetDateTime::now_utc();
            apply(record);
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl SummaryJobsRepo for InMemoryJobsRepo {
    async fn create_job(&self, job: NewSummaryJob) -> Result<SummaryJobRecord, RepoError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("insert rejected"));
        }
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(RepoError::Duplicate {
                constraint: "summary_jobs_pkey".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = SummaryJobRecord {
            id: job.id,
            state: JobState::Queued,
            spec_format: job.spec_format,
            spec_filename: job.spec_filename,
            spec_checksum: job.spec_checksum,
            queue_job_id: None,
            progress: Vec::new(),
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<SummaryJobRecord>, RepoError> {
        Ok(self.get(id).await)
    }

    async fn set_queue_job_id(&self, id: Uuid, queue_job_id: &str) -> Result<(), RepoError> {
        if self.fail_set_queue_id.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let mut jobs = self.jobs.lock().await;
        let record = jobs.get_mut(&id).ok_or(RepoError::NotFound)?;
        record.queue_job_id = Some(queue_job_id.to_string());
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<SummaryJobRecord, RepoError> {
        self.transition(id, JobState::Processing, |record| {
            record.attempts += 1;
            record.error = None;
        })
        .await
    }

    async fn record_progress(&self, id: Uuid, entry: ProgressEntry) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(record) = jobs.get_mut(&id) {
            if !record.state.is_terminal() {
                record.progress.push(entry);
            }
        }
        Ok(())
    }

    async fn mark_succeeded(
        &self,
        id: Uuid,
        summary: &SpecSummary,
        entry: ProgressEntry,
    ) -> Result<SummaryJobRecord, RepoError> {
        let summary = summary.clone();
        self.transition(id, JobState::Succeeded, move |record| {
            record.result = Some(summary);
            record.progress.push(entry);
            record.completed_at = Some(OffsetDateTime::now_utc());
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<SummaryJobRecord, RepoError> {
        let error = error.to_string();
        self.transition(id, JobState::Failed, move |record| {
            record.error = Some(error);
            record.completed_at = Some(OffsetDateTime::now_utc());
        })
        .await
    }

    async fn delete_expired(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|record| record.updated_at < cutoff)
            .map(|record| record.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        Ok(expired)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Err(RepoError::from_persistence("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    pub fail: AtomicBool,
    pub jobs: Mutex<Vec<NewQueueJob>>,
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let mut jobs = self.jobs.lock().await;
        jobs.push(job);
        Ok(format!("queue-{}", jobs.len()))
    }
}

/// Completion client returning canned text, optionally failing every call.
pub struct ScriptedCompletionClient {
    pub calls: AtomicUsize,
    pub fail_with: Option<u16>,
}

impl ScriptedCompletionClient {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_with: Some(status),
        })
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_with {
            return Err(CompletionError::Status {
                status,
                body: "upstream unavailable".into(),
            });
        }
        if request.prompt.starts_with("Analyze this API endpoint") {
            Ok("Endpoint analysis.".to_string())
        } else {
            Ok("Overview of the API.".to_string())
        }
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

pub fn sample_summary() -> SpecSummary {
    SpecSummary {
        spec_info: SpecInfo {
            title: "Petstore".into(),
            version: "1.0.0".into(),
            description: Some("Pets as a service".into()),
        },
        overview: "A small API for managing pets.".into(),
        endpoints: vec![EndpointSummary {
            method: "GET".into(),
            path: "/pets".into(),
            summary: Some("List pets".into()),
            analysis: "Returns every pet.\n\n- paginated\n- cached".into(),
        }],
        model: "scripted-model".into(),
        generated_at: datetime!(2024-05-01 12:00 UTC),
    }
}

pub fn job_record(state: JobState) -> SummaryJobRecord {
    let now = OffsetDateTime::now_utc();
    let terminal = state.is_terminal();
    SummaryJobRecord {
        id: Uuid::new_v4(),
        state,
        spec_format: SpecFormat::Json,
        spec_filename: "petstore.json".into(),
        spec_checksum: "abc123".into(),
        queue_job_id: Some("queue-1".into()),
        progress: vec![ProgressEntry::now("parsing", 100.0, "Parsed 1 endpoints")],
        result: (state == JobState::Succeeded).then(sample_summary),
        error: (state == JobState::Failed).then(|| "analysis of GET /pets failed".to_string()),
        attempts: 1,
        created_at: now,
        updated_at: now,
        completed_at: terminal.then_some(now),
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub jobs: Arc<InMemoryJobsRepo>,
    pub queue: Arc<RecordingQueue>,
    pub storage: Arc<introspector::infra::storage::JobStorage>,
    pub dir: tempfile::TempDir,
}

pub fn build_app(max_uploads: u32) -> TestApp {
    build_app_with_body_limit(max_uploads, 10 * 1024 * 1024)
}

pub fn build_app_with_body_limit(max_uploads: u32, max_request_bytes: usize) -> TestApp {
    use introspector::application::summaries::SummaryJobService;
    use introspector::infra::http::{self, HttpState, UploadRateLimiter};
    use introspector::infra::storage::JobStorage;

    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(JobStorage::new(dir.path().to_path_buf()).expect("storage"));
    let jobs = Arc::new(InMemoryJobsRepo::default());
    let queue = Arc::new(RecordingQueue::default());

    let jobs_repo: Arc<dyn SummaryJobsRepo> = jobs.clone();
    let job_queue: Arc<dyn JobQueue> = queue.clone();
    let state = HttpState {
        summaries: Arc::new(SummaryJobService::new(
            jobs_repo,
            job_queue,
            Arc::clone(&storage),
            3,
        )),
        rate_limiter: UploadRateLimiter::new(std::time::Duration::from_secs(60), max_uploads),
    };

    TestApp {
        router: http::build_router(state, max_request_bytes),
        jobs,
        queue,
        storage,
        dir,
    }
}

pub const BOUNDARY: &str = "introspector-test-boundary";

/// Hand-built multipart body with a single part.
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n\
         {data}\r\n\
         --{BOUNDARY}--\r\n"
    )
}

/// Same as [`multipart_body`] for payloads that are not valid UTF-8.
pub fn multipart_bytes(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
