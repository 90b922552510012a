//! OpenAPI summarization service: upload, queue, poll, export.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
