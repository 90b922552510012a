//! Cron job removing job records and files past their retention window.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;
use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    application::repos::{RepoError, SummaryJobsRepo},
    infra::{error::InfraError, storage::JobStorage, telemetry::METRIC_JOBS_PURGED},
};

/// Marker struct for the cron-triggered purge.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct PurgeExpiredJob;

impl From<chrono::DateTime<chrono::Utc>> for PurgeExpiredJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct PurgeExpiredContext {
    pub jobs: Arc<dyn SummaryJobsRepo>,
    pub storage: Arc<JobStorage>,
    pub retention: Duration,
}

pub async fn process_purge_expired_job(
    _job: PurgeExpiredJob,
    ctx: Data<PurgeExpiredContext>,
) -> Result<(), Error> {
    match purge_expired_jobs(&ctx, OffsetDateTime::now_utc()).await {
        Ok(count) if count > 0 => {
            info!(
                target = "application::jobs::purge_expired",
                purged = count,
                "purged expired summary jobs"
            );
        }
        Err(err) => {
            warn!(
                target = "application::jobs::purge_expired",
                error = %err,
                "failed to purge expired summary jobs"
            );
        }
        _ => {}
    }
    Ok(())
}

/// Delete records untouched for longer than the retention window, then their files.
pub async fn purge_expired_jobs(
    ctx: &PurgeExpiredContext,
    now: OffsetDateTime,
) -> Result<usize, RepoError> {
    let removed = ctx.jobs.delete_expired(now - ctx.retention).await?;

    for job_id in &removed {
        if let Err(err) = ctx.storage.remove_job(*job_id).await {
            warn!(
                target = "application::jobs::purge_expired",
                job_id = %job_id,
                error = %err,
                "failed to remove job files"
            );
        }
    }

    counter!(METRIC_JOBS_PURGED).increment(removed.len() as u64);
    Ok(removed.len())
}

/// Runs every hour at minute 0.
pub fn purge_expired_schedule() -> Result<Schedule, InfraError> {
    Schedule::from_str("0 0 * * * *")
        .map_err(|err| InfraError::configuration(format!("invalid purge schedule: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_correctly() {
        let schedule = purge_expired_schedule().expect("schedule");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}
