//! Application services: job bookkeeping, analysis, exports and workers.

pub mod analysis;
pub mod error;
pub mod export;
pub mod jobs;
pub mod prompts;
pub mod repos;
pub mod summaries;
