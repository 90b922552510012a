//! Route handlers for the public JSON API.

mod health;
mod spec;

pub use health::{health, readiness};
pub use spec::{export_summary, job_state, job_summary, upload_spec};

use uuid::Uuid;

use super::error::ApiError;

/// Unparseable identifiers name no job, so they are reported as not found.
fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found())
}
