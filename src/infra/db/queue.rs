use async_trait::async_trait;

use crate::application::repos::{JobQueue, NewQueueJob, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl JobQueue for PostgresRepositories {
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError> {
        let (id,): (String,) =
            sqlx::query_as("SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id")
                .bind(job.job_type.as_str())
                .bind(job.payload)
                .bind("Pending")
                .bind(job.run_at)
                .bind(job.max_attempts)
                .bind(job.priority)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(id)
    }
}
