use std::convert::TryFrom;

use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewSummaryJob, RepoError, SummaryJobsRepo},
    domain::{
        entities::{ProgressEntry, SummaryJobRecord},
        summary::SpecSummary,
        types::{JobState, SpecFormat},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const SUMMARY_JOB_COLUMNS: &str = "id, state, spec_format, spec_filename, spec_checksum, \
    queue_job_id, progress, result, error, attempts, created_at, updated_at, completed_at";

#[derive(sqlx::FromRow)]
struct SummaryJobRow {
    id: Uuid,
    state: String,
    spec_format: String,
    spec_filename: String,
    spec_checksum: String,
    queue_job_id: Option<String>,
    progress: Json<Vec<ProgressEntry>>,
    result: Option<Json<SpecSummary>>,
    error: Option<String>,
    attempts: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    completed_at: Option<OffsetDateTime>,
}

impl TryFrom<SummaryJobRow> for SummaryJobRecord {
    type Error = RepoError;

    fn try_from(row: SummaryJobRow) -> Result<Self, Self::Error> {
        let state = JobState::try_from(row.state.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job state `{}`", row.state))
        })?;
        let spec_format = SpecFormat::try_from(row.spec_format.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown spec format `{}`", row.spec_format))
        })?;

        Ok(Self {
            id: row.id,
            state,
            spec_format,
            spec_filename: row.spec_filename,
            spec_checksum: row.spec_checksum,
            queue_job_id: row.queue_job_id,
            progress: row.progress.0,
            result: row.result.map(|json| json.0),
            error: row.error,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

impl PostgresRepositories {
    /// Return the stored record for a job whose guarded update matched no row.
    async fn current_or_missing(&self, id: Uuid) -> Result<SummaryJobRecord, RepoError> {
        self.find_job(id).await?.ok_or(RepoError::NotFound)
    }
}

fn into_record(row: Option<SummaryJobRow>) -> Result<Option<SummaryJobRecord>, RepoError> {
    row.map(SummaryJobRecord::try_from).transpose()
}

#[async_trait]
impl SummaryJobsRepo for PostgresRepositories {
    async fn create_job(&self, job: NewSummaryJob) -> Result<SummaryJobRecord, RepoError> {
        let sql = format!(
            "INSERT INTO summary_jobs (id, state, spec_format, spec_filename, spec_checksum) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {SUMMARY_JOB_COLUMNS}"
        );

        let row = sqlx::query_as::<_, SummaryJobRow>(&sql)
            .bind(job.id)
            .bind(JobState::Queued.as_str())
            .bind(job.spec_format.as_str())
            .bind(job.spec_filename)
            .bind(job.spec_checksum)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        SummaryJobRecord::try_from(row)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<SummaryJobRecord>, RepoError> {
        let sql = format!("SELECT {SUMMARY_JOB_COLUMNS} FROM summary_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, SummaryJobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn set_queue_job_id(&self, id: Uuid, queue_job_id: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE summary_jobs SET queue_job_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(queue_job_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<SummaryJobRecord, RepoError> {
        let sql = format!(
            "UPDATE summary_jobs \
                SET state = $2, attempts = attempts + 1, error = NULL, updated_at = now() \
              WHERE id = $1 AND state IN ('queued', 'processing') \
              RETURNING {SUMMARY_JOB_COLUMNS}"
        );

        let row = sqlx::query_as::<_, SummaryJobRow>(&sql)
            .bind(id)
            .bind(JobState::Processing.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match into_record(row)? {
            Some(record) => Ok(record),
            None => self.current_or_missing(id).await,
        }
    }

    async fn record_progress(&self, id: Uuid, entry: ProgressEntry) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE summary_jobs \
                SET progress = progress || jsonb_build_array($2::jsonb), updated_at = now() \
              WHERE id = $1 AND state IN ('queued', 'processing')",
        )
        .bind(id)
        .bind(Json(&entry))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn mark_succeeded(
        &self,
        id: Uuid,
        summary: &SpecSummary,
        entry: ProgressEntry,
    ) -> Result<SummaryJobRecord, RepoError> {
        let sql = format!(
            "UPDATE summary_jobs \
                SET state = $2, \
                    result = $3, \
                    error = NULL, \
                    progress = progress || jsonb_build_array($4::jsonb), \
                    updated_at = now(), \
                    completed_at = now() \
              WHERE id = $1 AND state IN ('queued', 'processing') \
              RETURNING {SUMMARY_JOB_COLUMNS}"
        );

        let row = sqlx::query_as::<_, SummaryJobRow>(&sql)
            .bind(id)
            .bind(JobState::Succeeded.as_str())
            .bind(Json(summary))
            .bind(Json(&entry))
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match into_record(row)? {
            Some(record) => Ok(record),
            None => self.current_or_missing(id).await,
        }
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<SummaryJobRecord, RepoError> {
        let sql = format!(
            "UPDATE summary_jobs \
                SET state = $2, error = $3, updated_at = now(), completed_at = now() \
              WHERE id = $1 AND state IN ('queued', 'processing') \
              RETURNING {SUMMARY_JOB_COLUMNS}"
        );

        let row = sqlx::query_as::<_, SummaryJobRow>(&sql)
            .bind(id)
            .bind(JobState::Failed.as_str())
            .bind(error)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match into_record(row)? {
            Some(record) => Ok(record),
            None => self.current_or_missing(id).await,
        }
    }

    async fn delete_expired(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, RepoError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("DELETE FROM summary_jobs WHERE updated_at < $1 RETURNING id")
                .bind(cutoff)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
