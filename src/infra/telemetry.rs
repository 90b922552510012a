use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_JOBS_SUBMITTED: &str = "introspector_jobs_submitted_total";
pub const METRIC_JOBS_SUCCEEDED: &str = "introspector_jobs_succeeded_total";
pub const METRIC_JOBS_FAILED: &str = "introspector_jobs_failed_total";
pub const METRIC_JOBS_PURGED: &str = "introspector_jobs_purged_total";
pub const METRIC_JOB_DURATION_MS: &str = "introspector_job_duration_ms";
pub const METRIC_COMPLETION_RETRIES: &str = "introspector_completion_retries_total";
pub const METRIC_COMPLETION_LATENCY_MS: &str = "introspector_completion_latency_ms";
pub const METRIC_EXPORTS_RENDERED: &str = "introspector_exports_rendered_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_JOBS_SUBMITTED,
            Unit::Count,
            "Total number of specifications accepted for summarization."
        );
        describe_counter!(
            METRIC_JOBS_SUCCEEDED,
            Unit::Count,
            "Total number of summarization jobs that produced a summary."
        );
        describe_counter!(
            METRIC_JOBS_FAILED,
            Unit::Count,
            "Total number of summarization jobs that ended in failure."
        );
        describe_counter!(
            METRIC_JOBS_PURGED,
            Unit::Count,
            "Total number of expired job records removed by the purge schedule."
        );
        describe_histogram!(
            METRIC_JOB_DURATION_MS,
            Unit::Milliseconds,
            "Wall-clock time spent processing a summarization job."
        );
        describe_counter!(
            METRIC_COMPLETION_RETRIES,
            Unit::Count,
            "Completion requests retried after a transient failure."
        );
        describe_histogram!(
            METRIC_COMPLETION_LATENCY_MS,
            Unit::Milliseconds,
            "Latency of a completion call including retries, labelled by outcome."
        );
        describe_counter!(
            METRIC_EXPORTS_RENDERED,
            Unit::Count,
            "Exports rendered from a summary, labelled by format."
        );
    });
}
