mod context;
mod purge;
mod queue;
mod summarize;

pub use context::{JobWorkerContext, job_failed};
pub use purge::{
    PurgeExpiredContext, PurgeExpiredJob, process_purge_expired_job, purge_expired_jobs,
    purge_expired_schedule,
};
pub use queue::{enqueue_job, enqueue_summarize_spec_job};
pub use summarize::{
    SummarizeSpecJobPayload, SummarizeSpecJobError, process_summarize_spec_job,
    summarize_spec,
};
